//! Batch processor: admits a set of addresses as a numbered batch, probes every
//! address concurrently and commits each verdict as it lands.
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::db::{self, Pool};
use crate::error::{guarded, CheckerError, CheckerResult};
use crate::lifecycle::Lifecycle;
use crate::model::{BatchStatus, CheckResponse, HealthStatus, Link, LinkStatus};
use crate::probe::Probe;

pub struct Checker {
    pool: Pool,
    probe: Arc<dyn Probe>,
    lifecycle: Lifecycle,
    // Serializes "read max batch number + insert batch row".
    admission: tokio::sync::Mutex<()>,
}

impl Checker {
    pub fn new(pool: Pool, probe: Arc<dyn Probe>, lifecycle: Lifecycle) -> Self {
        Self {
            pool,
            probe,
            lifecycle,
            admission: tokio::sync::Mutex::new(()),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Read the current high-water batch number at startup.
    pub async fn load_batches(&self) -> CheckerResult<i64> {
        let max = db::get_max_batch_number(&self.pool)
            .await
            .map_err(|err| CheckerError::persistence("get_max_batch_number", err))?;
        info!(max_batch = max, "database loaded");
        Ok(max)
    }

    /// Check every address as one new batch and return the verdicts keyed by
    /// address. If `cancel` fires while links are being probed the call fails
    /// with `Cancelled`; verdicts already committed stay committed.
    #[instrument(skip_all, fields(links = addresses.len()))]
    pub async fn check_batch(
        &self,
        addresses: Vec<String>,
        cancel: &CancellationToken,
    ) -> CheckerResult<CheckResponse> {
        if addresses.is_empty() {
            return Err(CheckerError::InvalidInput("no links provided".into()));
        }
        if self.lifecycle.is_shutdown() {
            return Err(CheckerError::ShuttingDown);
        }
        if cancel.is_cancelled() {
            return Err(CheckerError::Cancelled);
        }

        let batch_number = self.admit_batch(addresses.len() as i64, cancel).await?;
        info!(batch = batch_number, "batch admitted");

        let link_ids = match self.create_links(&addresses, batch_number, cancel).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(batch = batch_number, ?err, "batch admission failed");
                if let Err(mark_err) =
                    db::update_batch_status(&self.pool, batch_number, BatchStatus::Failed).await
                {
                    error!(batch = batch_number, ?mark_err, "failed to mark batch failed");
                }
                return Err(err);
            }
        };

        let links = self
            .probe_links(addresses, link_ids, batch_number, cancel)
            .await;

        // Runs even after cancellation so the batch never stays `processing`.
        if let Err(err) =
            db::update_batch_status(&self.pool, batch_number, BatchStatus::Completed).await
        {
            error!(batch = batch_number, ?err, "failed to update batch status");
        }

        if cancel.is_cancelled() {
            warn!(batch = batch_number, "batch cancelled while probing");
            return Err(CheckerError::Cancelled);
        }

        info!(batch = batch_number, checked = links.len(), "batch completed");
        Ok(CheckResponse::from_links(batch_number, &links))
    }

    async fn admit_batch(&self, link_count: i64, cancel: &CancellationToken) -> CheckerResult<i64> {
        let _guard = self.admission.lock().await;
        let max = guarded(
            cancel,
            "get_max_batch_number",
            db::get_max_batch_number(&self.pool),
        )
        .await?;
        let batch_number = max + 1;
        // Awaited to completion: once the row exists the caller must close it out.
        db::create_batch(
            &self.pool,
            batch_number,
            link_count,
            BatchStatus::Processing,
            Utc::now(),
        )
        .await
        .map_err(|err| CheckerError::persistence("create_batch", err))?;
        Ok(batch_number)
    }

    /// Insert one `processing` row per address. Cancellation is only observed
    /// between inserts, so every row written belongs to a batch that gets
    /// closed out by the caller.
    async fn create_links(
        &self,
        addresses: &[String],
        batch_number: i64,
        cancel: &CancellationToken,
    ) -> CheckerResult<Vec<i64>> {
        let mut ids = Vec::with_capacity(addresses.len());
        for address in addresses {
            if cancel.is_cancelled() {
                return Err(CheckerError::Cancelled);
            }
            let id = db::create_link(
                &self.pool,
                address,
                LinkStatus::Processing,
                batch_number,
                None,
            )
            .await
            .map_err(|err| CheckerError::persistence("create_link", err))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// One task per link. Each task writes only its own slot, so result order
    /// always matches input order.
    async fn probe_links(
        &self,
        addresses: Vec<String>,
        link_ids: Vec<i64>,
        batch_number: i64,
        cancel: &CancellationToken,
    ) -> Vec<Link> {
        let slots: Arc<Mutex<Vec<Option<Link>>>> =
            Arc::new(Mutex::new(vec![None; addresses.len()]));
        let mut units = JoinSet::new();

        for (idx, (url, link_id)) in addresses.into_iter().zip(link_ids).enumerate() {
            let pool = self.pool.clone();
            let probe = Arc::clone(&self.probe);
            let cancel = cancel.clone();
            let slots = Arc::clone(&slots);

            units.spawn(async move {
                if cancel.is_cancelled() {
                    return;
                }

                let status = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    status = probe.probe(&url) => status,
                };
                let checked_at = status.is_terminal().then(Utc::now);

                if cancel.is_cancelled() {
                    return;
                }

                if let Err(err) = db::update_link_status(&pool, link_id, status, checked_at).await {
                    error!(%url, link_id, ?err, "failed to update link status");
                }

                slots.lock()[idx] = Some(Link {
                    id: link_id,
                    url,
                    status,
                    batch_number,
                    checked_at,
                });
            });
        }

        while let Some(joined) = units.join_next().await {
            if let Err(err) = joined {
                error!(batch = batch_number, ?err, "link task aborted");
            }
        }

        let links: Vec<Link> = slots.lock().drain(..).flatten().collect();
        links
    }

    /// Current verdicts of a stored batch.
    pub async fn batch_status(
        &self,
        batch_number: i64,
        cancel: &CancellationToken,
    ) -> CheckerResult<CheckResponse> {
        if self.lifecycle.is_shutdown() {
            return Err(CheckerError::ShuttingDown);
        }
        let batch = guarded(cancel, "get_batch", db::get_batch(&self.pool, batch_number)).await?;
        if batch.is_none() {
            return Err(CheckerError::NotFound(format!(
                "batch {} not found",
                batch_number
            )));
        }
        let links = guarded(
            cancel,
            "get_links_by_batch",
            db::get_links_by_batch(&self.pool, batch_number),
        )
        .await?;
        Ok(CheckResponse::from_links(batch_number, &links))
    }

    pub async fn health(&self) -> HealthStatus {
        let batches = match db::count_batches(&self.pool).await {
            Ok(count) => count,
            Err(err) => {
                warn!(?err, "failed to count batches");
                0
            }
        };
        HealthStatus {
            status: "healthy".into(),
            shutdown: self.lifecycle.is_shutdown(),
            batches,
            timestamp: Utc::now().timestamp(),
        }
    }
}

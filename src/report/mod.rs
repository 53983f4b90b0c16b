//! Report builder: reads stored batches and renders them into a document.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::db::{self, BatchWithLinks, Pool};
use crate::error::{guarded, CheckerError, CheckerResult};

pub mod pdf;

pub use pdf::PdfRenderer;

/// Turns batch records into document bytes. Must be a pure function of its
/// inputs so concurrent callers can share one renderer.
pub trait ReportRenderer: Send + Sync {
    fn render(
        &self,
        batches: &[BatchWithLinks],
        generated_at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Holds no mutable state, so one builder can serve the queue worker and any
/// number of synchronous callers at once.
#[derive(Clone)]
pub struct ReportBuilder {
    pool: Pool,
    renderer: Arc<dyn ReportRenderer>,
}

impl ReportBuilder {
    pub fn new(pool: Pool, renderer: Arc<dyn ReportRenderer>) -> Self {
        Self { pool, renderer }
    }

    /// Render every requested batch that exists. Unknown numbers are skipped
    /// unless none of them resolve.
    #[instrument(skip_all, fields(batches = ?batch_numbers))]
    pub async fn build(
        &self,
        batch_numbers: &[i64],
        cancel: &CancellationToken,
    ) -> CheckerResult<Vec<u8>> {
        if batch_numbers.is_empty() {
            return Err(CheckerError::InvalidInput("no batch numbers provided".into()));
        }

        let (batches, links) = guarded(
            cancel,
            "get_batches_and_links",
            db::get_batches_and_links(&self.pool, batch_numbers),
        )
        .await?;

        if batches.is_empty() {
            return Err(CheckerError::NotFound("no valid batches found".into()));
        }

        let grouped = BatchWithLinks::group(batches, links);
        let bytes = self
            .renderer
            .render(&grouped, Utc::now())
            .map_err(|err| CheckerError::Render(err.to_string()))?;
        info!(found = grouped.len(), size = bytes.len(), "report rendered");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchStatus, LinkStatus};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        calls: Mutex<Vec<Vec<(i64, Vec<String>)>>>,
    }

    impl ReportRenderer for RecordingRenderer {
        fn render(
            &self,
            batches: &[BatchWithLinks],
            _generated_at: DateTime<Utc>,
        ) -> anyhow::Result<Vec<u8>> {
            self.calls.lock().push(
                batches
                    .iter()
                    .map(|b| {
                        (
                            b.batch.number,
                            b.links.iter().map(|l| l.url.clone()).collect(),
                        )
                    })
                    .collect(),
            );
            Ok(b"report".to_vec())
        }
    }

    struct FailingRenderer;

    impl ReportRenderer for FailingRenderer {
        fn render(&self, _: &[BatchWithLinks], _: DateTime<Utc>) -> anyhow::Result<Vec<u8>> {
            Err(anyhow::anyhow!("encoder exploded"))
        }
    }

    async fn seeded_pool() -> Pool {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        for number in [1, 2] {
            db::create_batch(&pool, number, 2, BatchStatus::Processing, Utc::now())
                .await
                .unwrap();
            for i in 0..2 {
                db::create_link(
                    &pool,
                    &format!("b{}-{}.example", number, i),
                    LinkStatus::Available,
                    number,
                    Some(Utc::now()),
                )
                .await
                .unwrap();
            }
            db::update_batch_status(&pool, number, BatchStatus::Completed)
                .await
                .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn renders_found_batches_and_skips_unknown() {
        let renderer = Arc::new(RecordingRenderer::default());
        let builder = ReportBuilder::new(seeded_pool().await, renderer.clone());
        let bytes = builder
            .build(&[2, 99], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bytes, b"report");

        let calls = renderer.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![(2, vec!["b2-0.example".to_string(), "b2-1.example".to_string()])]
        );
    }

    #[tokio::test]
    async fn empty_and_unknown_requests_fail() {
        let builder = ReportBuilder::new(seeded_pool().await, Arc::new(PdfRenderer));
        let cancel = CancellationToken::new();
        assert!(matches!(
            builder.build(&[], &cancel).await,
            Err(CheckerError::InvalidInput(_))
        ));
        assert!(matches!(
            builder.build(&[999999], &cancel).await,
            Err(CheckerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn renderer_failure_surfaces() {
        let builder = ReportBuilder::new(seeded_pool().await, Arc::new(FailingRenderer));
        let err = builder
            .build(&[1], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckerError::Render(msg) if msg.contains("encoder exploded")));
    }

    #[tokio::test]
    async fn cancelled_build_fails() {
        let builder = ReportBuilder::new(seeded_pool().await, Arc::new(PdfRenderer));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            builder.build(&[1], &cancel).await,
            Err(CheckerError::Cancelled)
        ));
    }
}

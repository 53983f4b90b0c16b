//! Bounded in-process queue of report requests drained by a single worker.
//!
//! Callers either enqueue and wait for the worker's answer, or, when the
//! queue is full, build the report themselves on their own task.
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{CheckerError, CheckerResult};
use crate::lifecycle::Lifecycle;
use crate::report::ReportBuilder;

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// One queued request. The single-slot result channel never blocks the
/// sender, so the worker finishes its write even if the caller gave up.
#[derive(Debug)]
pub struct ReportTask {
    pub id: Uuid,
    pub batch_numbers: Vec<i64>,
    result: oneshot::Sender<CheckerResult<Vec<u8>>>,
}

impl ReportTask {
    pub fn new(batch_numbers: Vec<i64>) -> (Self, oneshot::Receiver<CheckerResult<Vec<u8>>>) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id: Uuid::new_v4(),
            batch_numbers,
            result: tx,
        };
        (task, rx)
    }

    fn complete(self, result: CheckerResult<Vec<u8>>) {
        if self.result.send(result).is_err() {
            info!(task_id = %self.id, "report requester went away before the result");
        }
    }
}

/// Outcome of a non-blocking enqueue attempt.
#[derive(Debug)]
pub enum Enqueue {
    Queued,
    /// Queue at capacity; the task is handed back to the caller.
    Full(ReportTask),
    /// Worker has exited; the task is handed back to the caller.
    Closed(ReportTask),
}

#[derive(Clone)]
pub struct ReportQueue {
    tx: mpsc::Sender<ReportTask>,
    builder: ReportBuilder,
    lifecycle: Lifecycle,
    wait_timeout: Duration,
}

/// Consumer half. Exactly one exists per queue and it is used up by `run`.
pub struct ReportWorker {
    rx: mpsc::Receiver<ReportTask>,
    builder: ReportBuilder,
}

impl ReportQueue {
    pub fn new(
        capacity: usize,
        wait_timeout: Duration,
        builder: ReportBuilder,
        lifecycle: Lifecycle,
    ) -> (Self, ReportWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            tx,
            builder: builder.clone(),
            lifecycle,
            wait_timeout,
        };
        (queue, ReportWorker { rx, builder })
    }

    /// Tasks sitting in the queue, not counting one the worker is building.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn try_enqueue(&self, task: ReportTask) -> Enqueue {
        match self.tx.try_send(task) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(task)) => Enqueue::Full(task),
            Err(mpsc::error::TrySendError::Closed(task)) => Enqueue::Closed(task),
        }
    }

    /// Produce a report for `batch_numbers`, through the worker when there is
    /// room in the queue and synchronously otherwise.
    #[instrument(skip_all, fields(batches = ?batch_numbers))]
    pub async fn request_report(
        &self,
        batch_numbers: Vec<i64>,
        cancel: &CancellationToken,
    ) -> CheckerResult<Vec<u8>> {
        if self.lifecycle.is_shutdown() {
            return Err(CheckerError::ShuttingDown);
        }
        if batch_numbers.is_empty() {
            return Err(CheckerError::InvalidInput("no batch numbers provided".into()));
        }

        let (task, result) = ReportTask::new(batch_numbers);
        let task_id = task.id;
        match self.try_enqueue(task) {
            Enqueue::Queued => {
                info!(%task_id, "queued report task");
                self.wait_for(result, cancel).await
            }
            Enqueue::Full(task) => {
                warn!(%task_id, "report queue full, generating report synchronously");
                self.builder.build(&task.batch_numbers, cancel).await
            }
            Enqueue::Closed(_) => {
                warn!(%task_id, "report worker has stopped");
                Err(CheckerError::ShuttingDown)
            }
        }
    }

    async fn wait_for(
        &self,
        result: oneshot::Receiver<CheckerResult<Vec<u8>>>,
        cancel: &CancellationToken,
    ) -> CheckerResult<Vec<u8>> {
        tokio::select! {
            res = result => match res {
                Ok(outcome) => outcome,
                // Worker dropped the task without answering: it is shutting down.
                Err(_) => Err(CheckerError::ShuttingDown),
            },
            _ = tokio::time::sleep(self.wait_timeout) => Err(CheckerError::Timeout),
            _ = cancel.cancelled() => Err(CheckerError::Cancelled),
        }
    }
}

impl ReportWorker {
    /// Build queued reports one at a time, in enqueue order, until `shutdown`
    /// fires. A stopped worker cannot be restarted.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("report worker shutting down");
                    return;
                }
                task = self.rx.recv() => match task {
                    Some(task) => {
                        let result = self.builder.build(&task.batch_numbers, &shutdown).await;
                        task.complete(result);
                    }
                    None => {
                        info!("report queue closed, worker exiting");
                        return;
                    }
                },
            }
        }
    }
}

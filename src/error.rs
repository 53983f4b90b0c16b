//! Failure kinds surfaced by the checker and report paths.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service is shutting down")]
    ShuttingDown,
    #[error("request cancelled")]
    Cancelled,
    #[error("report generation timed out")]
    Timeout,
    #[error("persistence failure during {op}: {source}")]
    Persistence {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to render report: {0}")]
    Render(String),
}

impl CheckerError {
    pub fn persistence(op: &'static str, source: anyhow::Error) -> Self {
        CheckerError::Persistence { op, source }
    }
}

pub type CheckerResult<T> = Result<T, CheckerError>;

/// Await a persistence future on behalf of a request, giving up with
/// `Cancelled` as soon as `cancel` fires.
pub(crate) async fn guarded<T, F>(
    cancel: &tokio_util::sync::CancellationToken,
    op: &'static str,
    fut: F,
) -> CheckerResult<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CheckerError::Cancelled),
        res = fut => res.map_err(|err| CheckerError::persistence(op, err)),
    }
}

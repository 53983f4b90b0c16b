use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, instrument};

use crate::checker::Checker;
use crate::error::CheckerError;
use crate::model::{CheckRequest, ReportRequest};
use crate::report_queue::ReportQueue;

#[derive(Clone)]
pub struct AppState {
    pub checker: Arc<Checker>,
    pub reports: ReportQueue,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/check", post(check_links))
        .route("/api/report", post(report))
        .route("/api/batch/:id", get(batch_status))
        .route("/api/health", get(health))
        .with_state(state)
}

impl IntoResponse for CheckerError {
    fn into_response(self) -> Response {
        let status = match &self {
            CheckerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CheckerError::NotFound(_) => StatusCode::NOT_FOUND,
            CheckerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            CheckerError::Cancelled
            | CheckerError::Timeout
            | CheckerError::Persistence { .. }
            | CheckerError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            CheckerError::Persistence { op, .. } => format!("persistence failure during {}", op),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

/// Token cancelled when the returned guard drops, which happens when the
/// handler returns or its future is dropped on client disconnect.
fn request_token() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

#[instrument(skip_all)]
async fn check_links(
    State(state): State<AppState>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Response {
    if state.checker.lifecycle().is_shutdown() {
        return CheckerError::ShuttingDown.into_response();
    }
    let Ok(Json(req)) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };

    // Detached so a disconnect cancels the batch instead of dropping it
    // half-written; the checker still closes the batch out.
    let (cancel, _guard) = request_token();
    let checker = Arc::clone(&state.checker);
    let work = tokio::spawn(async move { checker.check_batch(req.links, &cancel).await });
    match work.await {
        Ok(Ok(resp)) => Json(resp).into_response(),
        Ok(Err(err)) => {
            error!(?err, "check request failed");
            err.into_response()
        }
        Err(err) => {
            error!(?err, "check task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

#[instrument(skip_all)]
async fn batch_status(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    if state.checker.lifecycle().is_shutdown() {
        return CheckerError::ShuttingDown.into_response();
    }
    let Ok(Path(id)) = id else {
        return (StatusCode::BAD_REQUEST, "Invalid batch ID").into_response();
    };

    let (cancel, _guard) = request_token();
    match state.checker.batch_status(id, &cancel).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => err.into_response(),
    }
}

#[instrument(skip_all)]
async fn report(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Response {
    if state.checker.lifecycle().is_shutdown() {
        return CheckerError::ShuttingDown.into_response();
    }
    let Ok(Json(req)) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };

    let (cancel, _guard) = request_token();
    match state.reports.request_report(req.links_list, &cancel).await {
        Ok(pdf) => {
            let disposition = format!(
                "attachment; filename=url_report_{}.pdf",
                Utc::now().timestamp()
            );
            (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                pdf,
            )
                .into_response()
        }
        Err(err) => {
            error!(?err, "failed to generate report");
            err.into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    Json(state.checker.health().await).into_response()
}

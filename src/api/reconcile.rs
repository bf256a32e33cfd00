use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::app::AppState;
use crate::reconciler::{ReconcileError, ReconcileSummary};

#[derive(Debug, Serialize)]
struct ReconcileFailure<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<&'a ReconcileSummary>,
}

/// `GET /v1/reconcile` runs one reconciliation synchronously and returns its summary.
pub(crate) async fn trigger(State(state): State<AppState>) -> Response {
    state.telemetry().record_reconcile_trigger();

    match state.reconciler().reconcile_pending_jobs().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => {
            let status = match error {
                ReconcileError::AlreadyRunning => StatusCode::CONFLICT,
                ReconcileError::Scan { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = ReconcileFailure {
                error: error.to_string(),
                partial: error.partial(),
            };
            (status, Json(body)).into_response()
        }
    }
}

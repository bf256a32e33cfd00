use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::store::{Job, JobStatus, ResultRef};

/// User-visible view of a job. Placeholders and vendor payloads never leave the service.
#[derive(Debug, Serialize)]
pub(crate) struct JobView {
    id: Uuid,
    business_name: String,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let video_url = match (job.status, job.result_ref()) {
            (JobStatus::Complete, ResultRef::Resolved(url)) => Some(url),
            _ => None,
        };
        let error = match job.status {
            JobStatus::Failed => job.error,
            _ => None,
        };
        Self {
            id: job.id,
            business_name: job.business_name,
            status: job.status,
            video_url,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub(crate) async fn get_job(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let Ok(job_id) = Uuid::parse_str(raw_id.trim()) else {
        return error_response(StatusCode::BAD_REQUEST, "job id must be a UUID");
    };

    match state.store().get_job(job_id).await {
        Ok(Some(job)) => Json(JobView::from(job)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "job not found"),
        Err(e) => {
            error!(%job_id, error = %format!("{e:#}"), "failed to load job");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load job")
        }
    }
}

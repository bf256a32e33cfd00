use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl HealthReport {
    fn ready() -> Self {
        Self {
            status: "ready",
            detail: None,
        }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: "degraded",
            detail: Some(detail.into()),
        }
    }
}

pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    if let Err(error) = state.store().ping().await {
        state.telemetry().record_ready_probe(false);
        error!(error = %format!("{error:#}"), "job store readiness check failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::degraded("job store unreachable")),
        ));
    }

    state.telemetry().record_ready_probe(true);
    Ok(Json(HealthReport::ready()))
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_probe();
    Json(HealthReport {
        status: "live",
        detail: None,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use crate::api::test_support::{read_json, registry_with};
    use crate::app::build_router;
    use crate::clients::VendorRegistry;
    use crate::store::MemoryJobStore;

    async fn probe(store: &Arc<MemoryJobStore>, uri: &str) -> axum::response::Response {
        let app = build_router(registry_with(store, VendorRegistry::new()));
        let request = Request::get(uri).body(Body::empty()).expect("request builds");
        app.oneshot(request).await.expect("request succeeds")
    }

    #[tokio::test]
    async fn ready_reports_store_reachability() {
        let store = Arc::new(MemoryJobStore::new());

        let healthy = probe(&store, "/health/ready").await;
        assert_eq!(healthy.status(), StatusCode::OK);
        assert_eq!(read_json(healthy).await["status"], "ready");

        store.fail_ping(true);
        let degraded = probe(&store, "/health/ready").await;
        assert_eq!(degraded.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = read_json(degraded).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["detail"], "job store unreachable");
    }

    #[tokio::test]
    async fn live_does_not_touch_the_store() {
        let store = Arc::new(MemoryJobStore::new());
        store.fail_ping(true);

        let response = probe(&store, "/health/live").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "live");
    }

    #[tokio::test]
    async fn metrics_are_exposed_in_text_format() {
        let store = Arc::new(MemoryJobStore::new());

        let response = probe(&store, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let text = String::from_utf8(body.to_vec()).expect("utf-8");
        assert!(text.contains("promo_reconcile_runs_total"));
    }
}

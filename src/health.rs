// ============================================================================
// Module: src/health.rs
// Description: Liveness/readiness endpoints for the combined binary, spec §6
// ============================================================================

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use invoice_shared::database::health::HealthChecker;
use serde::Serialize;
use std::sync::Arc;

use crate::AppContext;

/// `/health`, `/ready`, `/live` resolved against `app_context` up front so
/// the returned router carries no unresolved state and can be merged
/// alongside the mounted services' own (already state-resolved) routers.
pub fn router(app_context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .with_state(app_context)
}

#[derive(Serialize)]
pub struct LivenessResponse {
    pub alive: bool,
}

pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse { alive: true }))
}

pub async fn readiness_check(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let checker = HealthChecker::new(ctx.pool.clone());
    let ready = checker.is_ready().await;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(serde_json::json!({ "ready": ready })))
}

pub async fn health_check(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let checker = HealthChecker::new(ctx.pool.clone());
    let result = checker.check_health().await;
    let status = if result.errors.is_empty() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn liveness_does_not_touch_the_database() {
        let app = Router::new().route("/live", get(liveness_check));

        let response = app
            .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}

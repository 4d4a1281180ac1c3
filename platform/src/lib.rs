// ============================================================================
// Module: platform/src/lib.rs
// Description: Tenant config loader, task registry, and dashboard aggregator
// ============================================================================

pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Top-level router for this service's endpoint group, nested under `/api`
/// by the root binary alongside `invoice-auth`/`invoice-core`, spec §6.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(handlers::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

pub async fn health_check() -> &'static str {
    "invoice-platform healthy"
}

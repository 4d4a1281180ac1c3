// ============================================================================
// Module: platform/src/handlers/mod.rs
// Description: HTTP handlers for the platform service (C5 tenant config, C13
// dashboard aggregator)
// ============================================================================

pub mod config;
pub mod dashboard;
pub mod tasks;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(config::router(state.clone()))
        .merge(dashboard::router(state.clone()))
        .merge(tasks::router(state))
}

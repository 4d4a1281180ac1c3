// ============================================================================
// Module: auth/src/lib.rs
// Description: Auth router, spec §6 — login is public, everything else under
// this router requires a verified bearer token
// ============================================================================

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::AuthService;

pub fn create_router(auth_service: Arc<AuthService>) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(handlers::get_current_user))
        .layer(from_fn(middleware::auth_middleware));

    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/health", get(handlers::health_check))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(axum::Extension(auth_service)),
        )
}

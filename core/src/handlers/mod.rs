// ============================================================================
// Module: core/src/handlers/mod.rs
// Description: HTTP handler modules and router composition, spec §6
// ============================================================================

pub mod inventory;
pub mod purchase_orders;
pub mod review;
pub mod stock;
pub mod upload;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Merges every endpoint group under one router, mirroring the teacher's
/// `create_product_router`/`create_order_router` composition in
/// `commerce/src/lib.rs`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(upload::router(state.clone()))
        .merge(inventory::router(state.clone()))
        .merge(review::router(state.clone()))
        .merge(stock::router(state.clone()))
        .merge(purchase_orders::router(state))
}

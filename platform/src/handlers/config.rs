// ============================================================================
// Module: platform/src/handlers/config.rs
// Description: Tenant config lookup, spec §4.5
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::Result;
use serde::Deserialize;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/platform/config", get(get_config)).with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct GetConfigQuery {
    #[serde(default)]
    pub bypass_cache: bool,
}

async fn get_config(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Query(query): Query<GetConfigQuery>,
) -> Result<Json<crate::models::MergedTenantConfig>> {
    let merged = state.tenant_config.load(&ctx.tenant, query.bypass_cache).await?;
    Ok(Json((*merged).clone()))
}

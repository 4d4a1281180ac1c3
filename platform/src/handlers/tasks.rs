// ============================================================================
// Module: platform/src/handlers/tasks.rs
// Description: Recalculation task status lookup, spec §4.7
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::{Error, Result};
use invoice_shared::models::task::RecalculationTask;
use uuid::Uuid;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/platform/tasks/recalculation/recent", get(recent))
        .route("/platform/tasks/recalculation/:task_id", get(status))
        .with_state(state)
}

async fn recent(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Result<Json<Option<RecalculationTask>>> {
    Ok(Json(state.task_registry.most_recent(&ctx.tenant).await?))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<RecalculationTask>> {
    state
        .task_registry
        .status(&ctx.tenant, task_id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound("recalculation task".to_string()))
}

// ============================================================================
// Module: core/src/handlers/purchase_orders.rs
// Description: Draft-basket and finalize/PDF endpoints, spec §6/§4.11
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::Result;
use invoice_shared::models::purchase_order::DraftPOLine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::services::purchase_order::PurchaseOrderWorkflow;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/purchase-orders/draft/items", get(draft_items))
        .route("/purchase-orders/draft/proceed", post(draft_proceed))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct DraftItemsResponse {
    pub items: Vec<DraftPOLine>,
    pub total_cost: Decimal,
}

async fn draft_items(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Result<Json<DraftItemsResponse>> {
    let workflow = PurchaseOrderWorkflow::new(state.pool.clone());
    let items = workflow.draft_items(&ctx.tenant).await?;
    let total_cost = items.iter().map(|i| i.quantity_value()).sum();
    Ok(Json(DraftItemsResponse { items, total_cost }))
}

#[derive(Debug, Deserialize)]
pub struct DraftProceedRequest {
    pub supplier_name: Option<String>,
    pub notes: Option<String>,
}

async fn draft_proceed(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Json(request): Json<DraftProceedRequest>,
) -> Result<Response> {
    let workflow = PurchaseOrderWorkflow::new(state.pool.clone());
    let (order, pdf_bytes) = workflow.finalize(&ctx.tenant, request.supplier_name, request.notes).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::HeaderName::from_static("x-po-number"), order.po_number),
            (header::HeaderName::from_static("x-total-cost"), order.total_cost.to_string()),
        ],
        pdf_bytes,
    )
        .into_response())
}

trait DraftLineValue {
    fn quantity_value(&self) -> Decimal;
}

impl DraftLineValue for DraftPOLine {
    fn quantity_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_value
    }
}

// ============================================================================
// Module: core/src/handlers/stock.rs
// Description: Vendor-mapping-sheet upload endpoint, spec §6
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::{Error, Result};
use invoice_shared::models::stock::{parse_stock_token, Priority};
use serde::Serialize;

use crate::services::ingestion::MAPPING_SYSTEM_PROMPT;
use crate::services::object_store::{build_key, UploadKind};
use crate::services::vision_extractor::{ExtractedItem, ExtractionKind};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stock/mapping-sheets/upload", post(upload_mapping_sheet))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ExtractedRow {
    part_number: Option<String>,
    vendor_description: Option<String>,
    customer_item_alias: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MappingSheetResponse {
    pub extracted_rows: Vec<ExtractedRow>,
    pub message: String,
}

/// Extracts a mapping sheet with the shared vision pipeline, upserts each
/// row's part_number/alias pair into `vendor_mapping_entries`, and applies
/// any handwritten priority/reorder/physical-count tokens to the matching
/// `StockLevel` row, spec §4.10.
async fn upload_mapping_sheet(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    mut multipart: Multipart,
) -> Result<Json<MappingSheetResponse>> {
    let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest(e.to_string()))? else {
        return Err(Error::BadRequest("no file provided".to_string()));
    };
    let filename = field.file_name().unwrap_or("mapping.jpg").to_string();
    let bytes = field.bytes().await.map_err(|e| Error::BadRequest(e.to_string()))?;

    let key = build_key(&ctx.tenant, UploadKind::Mappings, &filename);
    state.object_store.put(state.bucket(), &key, bytes.to_vec(), "image/jpeg").await?;

    let extraction = state
        .vision
        .extract(&bytes, MAPPING_SYSTEM_PROMPT, ExtractionKind::MappingSheet)
        .await?;

    let mut rows = Vec::new();
    for item in &extraction.items {
        let part_number = item.fields.get("part_number").and_then(|v| v.as_str()).map(String::from);
        let vendor_description = item.fields.get("vendor_description").and_then(|v| v.as_str()).map(String::from);
        let customer_item_alias = item.fields.get("customer_item_alias").and_then(|v| v.as_str()).map(String::from);

        if let Some(part_number) = &part_number {
            sqlx::query(
                r#"
                INSERT INTO vendor_mapping_entries (tenant, part_number, vendor_descriptions, customer_item_aliases)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (tenant, part_number) DO UPDATE SET
                    vendor_descriptions = vendor_mapping_entries.vendor_descriptions || EXCLUDED.vendor_descriptions,
                    customer_item_aliases = vendor_mapping_entries.customer_item_aliases || EXCLUDED.customer_item_aliases
                "#,
            )
            .bind(&ctx.tenant)
            .bind(part_number)
            .bind(sqlx::types::Json(vendor_description.iter().cloned().collect::<Vec<_>>()))
            .bind(sqlx::types::Json(customer_item_alias.iter().cloned().collect::<Vec<_>>()))
            .execute(&state.pool)
            .await?;

            apply_handwritten_stock_tokens(&state, &ctx.tenant, part_number, item).await?;
        }

        rows.push(ExtractedRow { part_number, vendor_description, customer_item_alias });
    }

    Ok(Json(MappingSheetResponse {
        message: format!("{} rows extracted", rows.len()),
        extracted_rows: rows,
    }))
}

/// Parses the sheet's handwritten priority/reorder/physical-count tokens
/// with the spec's tolerant parsers and, when the part already has a
/// `StockLevel` row, applies them: priority/reorder_point are updated when
/// present, and a declared physical count sets `manual_adjustment =
/// physical - current_stock` and `old_stock = physical`, spec §4.10.
async fn apply_handwritten_stock_tokens(
    state: &AppState,
    tenant: &str,
    part_number: &str,
    item: &ExtractedItem,
) -> Result<()> {
    let priority = raw_token(item, "priority").and_then(|raw| Priority::parse_token(&raw));
    let reorder_point = raw_token(item, "reorder_point").and_then(|raw| parse_stock_token(&raw));
    let physical_count = raw_token(item, "physical_count").and_then(|raw| parse_stock_token(&raw));

    if priority.is_none() && reorder_point.is_none() && physical_count.is_none() {
        return Ok(());
    }

    let current_stock: Option<i64> = sqlx::query_scalar(
        "SELECT current_stock FROM stock_levels WHERE tenant = $1 AND part_number = $2",
    )
    .bind(tenant)
    .bind(part_number)
    .fetch_optional(&state.pool)
    .await?;

    let Some(current_stock) = current_stock else {
        return Ok(());
    };

    let manual_adjustment = physical_count.map(|physical| physical - current_stock);
    let old_stock = physical_count;

    sqlx::query(
        r#"
        UPDATE stock_levels
        SET priority = COALESCE($1, priority),
            reorder_point = COALESCE($2, reorder_point),
            manual_adjustment = COALESCE($3, manual_adjustment),
            old_stock = COALESCE($4, old_stock)
        WHERE tenant = $5 AND part_number = $6
        "#,
    )
    .bind(priority)
    .bind(reorder_point)
    .bind(manual_adjustment)
    .bind(old_stock)
    .bind(tenant)
    .bind(part_number)
    .execute(&state.pool)
    .await?;

    Ok(())
}

/// A handwritten token may come back from the vision extractor as a JSON
/// string or a bare number; both are valid input to the tolerant parsers.
fn raw_token(item: &ExtractedItem, key: &str) -> Option<String> {
    item.fields.get(key).map(|value| match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

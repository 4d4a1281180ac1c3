// ============================================================================
// Module: core/src/handlers/review.rs
// Description: Dates/amounts review and `Sync & Finish` endpoints, spec §6/§4.9
// ============================================================================

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Extension, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use futures::Stream;
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::Result;
use invoice_shared::models::verification::{VerificationHeader, VerificationLine};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::services::verification::{SyncFinishEngine, SyncFinishResult};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/review/dates", get(list_dates))
        .route("/review/dates/update", put(update_date))
        .route("/review/amounts", get(list_amounts))
        .route("/review/receipt/:receipt_number", delete(delete_receipt))
        .route("/review/sync-finish", post(sync_finish))
        .route("/review/sync-finish/stream", get(sync_finish_stream))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse<T> {
    pub records: Vec<T>,
    pub total: usize,
}

async fn list_dates(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Result<Json<RecordsResponse<VerificationHeader>>> {
    let records: Vec<VerificationHeader> = sqlx::query_as(
        "SELECT * FROM verification_headers WHERE tenant = $1 ORDER BY receipt_number, date",
    )
    .bind(&ctx.tenant)
    .fetch_all(&state.pool)
    .await?;
    let total = records.len();
    Ok(Json(RecordsResponse { records, total }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDateRequest {
    pub row_id: String,
    pub receipt_number: Option<String>,
    pub date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct UpdateDateResponse {
    pub line_items_updated: u64,
}

async fn update_date(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Json(request): Json<UpdateDateRequest>,
) -> Result<Json<UpdateDateResponse>> {
    let result = sqlx::query(
        "UPDATE verification_headers SET receipt_number = COALESCE($3, receipt_number), date = $4, updated_at = now()
         WHERE row_id = $1 AND tenant = $2",
    )
    .bind(&request.row_id)
    .bind(&ctx.tenant)
    .bind(&request.receipt_number)
    .bind(request.date)
    .execute(&state.pool)
    .await?;

    Ok(Json(UpdateDateResponse { line_items_updated: result.rows_affected() }))
}

async fn list_amounts(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Result<Json<RecordsResponse<VerificationLine>>> {
    let records: Vec<VerificationLine> =
        sqlx::query_as("SELECT * FROM verification_lines WHERE tenant = $1 ORDER BY created_at")
            .bind(&ctx.tenant)
            .fetch_all(&state.pool)
            .await?;
    let total = records.len();
    Ok(Json(RecordsResponse { records, total }))
}

async fn delete_receipt(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Path(receipt_number): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let mut tx = state.pool.begin().await?;

    sqlx::query("DELETE FROM staging_invoices WHERE tenant = $1 AND receipt_number = $2")
        .bind(&ctx.tenant)
        .bind(&receipt_number)
        .execute(&mut *tx)
        .await?;

    let header_ids: Vec<uuid::Uuid> = sqlx::query_scalar(
        "DELETE FROM verification_headers WHERE tenant = $1 AND receipt_number = $2 RETURNING id",
    )
    .bind(&ctx.tenant)
    .bind(&receipt_number)
    .fetch_all(&mut *tx)
    .await?;

    for header_id in header_ids {
        sqlx::query("DELETE FROM verification_lines WHERE header_id = $1")
            .bind(header_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

async fn sync_finish(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Result<Json<SyncFinishResult>> {
    let engine = SyncFinishEngine::new(state.pool.clone());
    let result = engine.run(&ctx.tenant, None).await?;
    Ok(Json(result))
}

/// §4.9.3 step S9 streamed over SSE, grounded on the teacher's
/// `async-stream`-based event handlers.
async fn sync_finish_stream(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(16);
    let pool = state.pool.clone();
    let tenant = ctx.tenant.clone();

    tokio::spawn(async move {
        let engine = SyncFinishEngine::new(pool);
        let _ = engine.run(&tenant, Some(tx)).await;
    });

    let events = stream! {
        let mut rx = rx;
        while let Some(progress) = rx.recv().await {
            let payload = serde_json::json!({
                "stage": progress.stage.tag(),
                "percentage": progress.percentage,
                "message": progress.message,
            });
            yield Ok(Event::default().data(payload.to_string()));
        }
    };

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

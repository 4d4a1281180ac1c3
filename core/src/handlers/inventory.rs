// ============================================================================
// Module: core/src/handlers/inventory.rs
// Description: Vendor invoice upload/process endpoints, spec §6
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::{Error, Result};
use invoice_shared::models::task::{TaskStatus, UploadKind, UploadTask};
use invoice_shared::services::TaskRegistry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::ingestion::{IngestionPipeline, PipelineKind, VENDOR_SYSTEM_PROMPT};
use crate::services::stock_engine::StockEngine;
use crate::state::AppState;

use super::upload::{insert_task, update_task};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/inventory/upload", post(upload_files))
        .route("/inventory/process", post(process_files))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct UploadFilesResponse {
    pub uploaded_files: Vec<String>,
}

async fn upload_files(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    mut multipart: Multipart,
) -> Result<Json<UploadFilesResponse>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest(e.to_string()))? {
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field.bytes().await.map_err(|e| Error::BadRequest(e.to_string()))?;
        files.push((filename, bytes.to_vec(), content_type));
    }

    let pipeline = IngestionPipeline::new(
        state.pool.clone(),
        state.object_store.clone(),
        state.vision.clone(),
        state.config.ingestion.clone(),
    );

    let keys = pipeline
        .upload_batch(&ctx.tenant, state.bucket(), PipelineKind::Vendor, files)
        .await;

    Ok(Json(UploadFilesResponse { uploaded_files: keys }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessFilesRequest {
    pub file_keys: Vec<String>,
    #[serde(default)]
    pub force_upload: bool,
}

#[derive(Debug, Serialize)]
pub struct ProcessFilesResponse {
    pub task_id: Uuid,
    pub status: &'static str,
}

/// §4.8.2: once a vendor batch finishes, stock recalculation (C10) is
/// enqueued for the tenant.
async fn process_files(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Json(request): Json<ProcessFilesRequest>,
) -> Result<Json<ProcessFilesResponse>> {
    let mut task = UploadTask::new(ctx.tenant.clone(), UploadKind::Purchase);
    task.uploaded_blob_keys = sqlx::types::Json(request.file_keys.clone());
    insert_task(&state, &task).await?;

    let task_id = task.task_id;

    let pool = state.pool.clone();
    let object_store = state.object_store.clone();
    let vision = state.vision.clone();
    let config = state.config.clone();
    let tenant = ctx.tenant.clone();
    let bucket = state.bucket().to_string();
    let file_keys = request.file_keys;
    let force_upload = request.force_upload;

    tokio::spawn(async move {
        let pipeline = IngestionPipeline::new(pool.clone(), object_store, vision, config.ingestion.clone());
        let result = pipeline
            .process_batch(&tenant, &bucket, PipelineKind::Vendor, file_keys, force_upload, &mut task, VENDOR_SYSTEM_PROMPT)
            .await;

        match result {
            Ok(()) => {
                let registry = TaskRegistry::new(pool.clone());
                let recalc_task = registry.create_recalculation_task(&tenant).await.ok();

                let engine = StockEngine::new(pool.clone());
                match engine.recalculate(&tenant).await {
                    Ok(()) => {
                        if let Some(recalc_task) = &recalc_task {
                            let _ = registry.mark_completed(recalc_task.task_id).await;
                        }
                    }
                    Err(e) => {
                        task.message = Some(format!("stock recalculation failed: {e}"));
                        if let Some(recalc_task) = &recalc_task {
                            let _ = registry.mark_failed(recalc_task.task_id, &e.to_string()).await;
                        }
                    }
                }
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.message = Some(e.to_string());
            }
        }

        let _ = update_task(&pool, &task).await;
    });

    Ok(Json(ProcessFilesResponse { task_id, status: "queued" }))
}

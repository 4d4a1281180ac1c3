// ============================================================================
// Module: core/src/handlers/upload.rs
// Description: Sales-image upload/process endpoints, spec §6
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::{Error, Result};
use invoice_shared::models::task::{TaskStatus, UploadKind, UploadTask};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::ingestion::{IngestionPipeline, PipelineKind};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload/files", post(upload_files))
        .route("/upload/process-files", post(process_files))
        .route("/upload/process/status/:task_id", get(task_status))
        .route("/upload/recent-task", get(recent_task))
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
        .upload_batch(&ctx.tenant, state.bucket(), PipelineKind::Sales, files)
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

async fn process_files(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Json(request): Json<ProcessFilesRequest>,
) -> Result<Json<ProcessFilesResponse>> {
    let mut task = UploadTask::new(ctx.tenant.clone(), UploadKind::Sales);
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
            .process_batch(
                &tenant,
                &bucket,
                PipelineKind::Sales,
                file_keys,
                force_upload,
                &mut task,
                crate::services::ingestion::SALES_SYSTEM_PROMPT,
            )
            .await;
        if let Err(e) = result {
            task.status = TaskStatus::Failed;
            task.message = Some(e.to_string());
        }
        let _ = update_task(&pool, &task).await;
    });

    Ok(Json(ProcessFilesResponse { task_id, status: "queued" }))
}

async fn task_status(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<UploadTask>> {
    let task: Option<UploadTask> =
        sqlx::query_as("SELECT * FROM upload_tasks WHERE task_id = $1 AND tenant = $2")
            .bind(task_id)
            .bind(&ctx.tenant)
            .fetch_optional(&state.pool)
            .await?;
    task.map(Json).ok_or_else(|| Error::NotFound(format!("task {task_id} not found")))
}

async fn recent_task(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Result<Json<Option<UploadTask>>> {
    let task: Option<UploadTask> = sqlx::query_as(
        "SELECT * FROM upload_tasks WHERE tenant = $1 AND kind = $2 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(&ctx.tenant)
    .bind(UploadKind::Sales)
    .fetch_optional(&state.pool)
    .await?;
    Ok(Json(task))
}

pub(crate) async fn insert_task(state: &AppState, task: &UploadTask) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO upload_tasks
            (task_id, tenant, kind, status, progress, duplicates, uploaded_blob_keys, current_file, message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(task.task_id)
    .bind(&task.tenant)
    .bind(task.kind)
    .bind(task.status)
    .bind(&task.progress)
    .bind(&task.duplicates)
    .bind(&task.uploaded_blob_keys)
    .bind(&task.current_file)
    .bind(&task.message)
    .execute(&state.pool)
    .await?;
    Ok(())
}

pub(crate) async fn update_task(pool: &invoice_shared::database::DbPool, task: &UploadTask) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE upload_tasks SET
            status = $2, progress = $3, duplicates = $4, uploaded_blob_keys = $5,
            current_file = $6, message = $7, updated_at = now()
        WHERE task_id = $1
        "#,
    )
    .bind(task.task_id)
    .bind(task.status)
    .bind(&task.progress)
    .bind(&task.duplicates)
    .bind(&task.uploaded_blob_keys)
    .bind(&task.current_file)
    .bind(&task.message)
    .execute(pool)
    .await?;
    Ok(())
}

// ============================================================================
// Module: shared/src/models/task.rs
// Description: Task Registry entities (C7, spec §3/§4.7)
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::TenantScoped;

/// Status of an `UploadTask` or `RecalculationTask`, spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Uploading,
    Processing,
    DuplicateDetected,
    Completed,
    Failed,
}

/// Which ingestion pipeline (C8) this task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "upload_kind", rename_all = "snake_case")]
pub enum UploadKind {
    Sales,
    Purchase,
}

/// `{total, processed, failed}` progress counters, spec §3.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: i32,
    pub processed: i32,
    pub failed: i32,
}

impl TaskProgress {
    pub fn is_complete(&self) -> bool {
        self.processed + self.failed >= self.total
    }
}

/// Durable record of an upload/ingestion batch (C7). Mutated only by the
/// owning worker; the "recent task" lookup (§4.7) selects the most-recent
/// row per `(tenant, kind)` so a browser reload resumes the progress bar.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadTask {
    pub task_id: Uuid,
    pub tenant: String,
    pub kind: UploadKind,
    pub status: TaskStatus,
    #[sqlx(json)]
    pub progress: sqlx::types::Json<TaskProgress>,
    #[sqlx(json)]
    pub duplicates: sqlx::types::Json<Vec<String>>,
    #[sqlx(json)]
    pub uploaded_blob_keys: sqlx::types::Json<Vec<String>>,
    pub current_file: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadTask {
    pub fn new(tenant: impl Into<String>, kind: UploadKind) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            tenant: tenant.into(),
            kind,
            status: TaskStatus::Queued,
            progress: sqlx::types::Json(TaskProgress::default()),
            duplicates: sqlx::types::Json(Vec::new()),
            uploaded_blob_keys: sqlx::types::Json(Vec::new()),
            current_file: None,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TenantScoped for UploadTask {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// Durable record of a stock recalculation run (C10), analogous to
/// `UploadTask` per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecalculationTask {
    pub task_id: Uuid,
    pub tenant: String,
    pub status: TaskStatus,
    #[sqlx(json)]
    pub progress: sqlx::types::Json<TaskProgress>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecalculationTask {
    pub fn new(tenant: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            tenant: tenant.into(),
            status: TaskStatus::Queued,
            progress: sqlx::types::Json(TaskProgress::default()),
            message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TenantScoped for RecalculationTask {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

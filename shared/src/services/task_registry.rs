// ============================================================================
// Module: shared/src/services/task_registry.rs
// Description: Task Registry (C7), spec §4.7
// ============================================================================

use crate::error::Result;
use crate::models::task::{RecalculationTask, TaskStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Create/mutate/read `recalculation_tasks` rows. Lives in `invoice-shared`
/// rather than a single service crate so both `invoice-core` (which
/// triggers recalculation from the ingestion pipeline) and
/// `invoice-platform` (which surfaces task status on the dashboard) can
/// depend on it without a cross-service edge between them. `UploadTask`
/// rows are managed inline by `invoice-core`'s `upload.rs`/`inventory.rs`
/// instead, since their creation/update is embedded in the same
/// request/worker code path that drives the ingestion pipeline; this
/// registry only needed to exist for the one task kind with no natural
/// owner there, `RecalculationTask`.
pub struct TaskRegistry {
    pool: PgPool,
}

impl TaskRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_recalculation_task(&self, tenant: &str) -> Result<RecalculationTask> {
        let task = RecalculationTask::new(tenant.to_string());
        sqlx::query(
            "INSERT INTO recalculation_tasks (task_id, tenant, status, progress, message) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(task.task_id)
        .bind(&task.tenant)
        .bind(task.status)
        .bind(&task.progress)
        .bind(&task.message)
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    pub async fn mark_completed(&self, task_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE recalculation_tasks SET status = $2, updated_at = now() WHERE task_id = $1")
            .bind(task_id)
            .bind(TaskStatus::Completed)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, task_id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE recalculation_tasks SET status = $2, message = $3, updated_at = now() WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(TaskStatus::Failed)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn status(&self, tenant: &str, task_id: Uuid) -> Result<Option<RecalculationTask>> {
        sqlx::query_as("SELECT * FROM recalculation_tasks WHERE task_id = $1 AND tenant = $2")
            .bind(task_id)
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    /// "Recent task" lookup, spec §4.7: most-recent row per tenant so a
    /// reload can resume the progress bar.
    pub async fn most_recent(&self, tenant: &str) -> Result<Option<RecalculationTask>> {
        sqlx::query_as("SELECT * FROM recalculation_tasks WHERE tenant = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../migrations")]
    async fn recalculation_task_lifecycle(pool: PgPool) {
        let registry = TaskRegistry::new(pool);

        let task = registry.create_recalculation_task("acme").await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);

        registry.mark_completed(task.task_id).await.unwrap();
        let status = registry.status("acme", task.task_id).await.unwrap().unwrap();
        assert_eq!(status.status, TaskStatus::Completed);

        let recent = registry.most_recent("acme").await.unwrap().unwrap();
        assert_eq!(recent.task_id, task.task_id);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn status_lookup_is_scoped_by_tenant(pool: PgPool) {
        let registry = TaskRegistry::new(pool);
        let task = registry.create_recalculation_task("acme").await.unwrap();
        assert!(registry.status("other-tenant", task.task_id).await.unwrap().is_none());
    }
}

// ============================================================================
// Module: platform/src/state.rs
// Description: Shared state for the platform service's handlers
// ============================================================================

use sqlx::PgPool;

use crate::services::{DashboardAggregator, TaskRegistry, TenantConfigLoader};

pub struct AppState {
    pub pool: PgPool,
    pub tenant_config: TenantConfigLoader,
    pub task_registry: TaskRegistry,
    pub dashboard: DashboardAggregator,
}

impl AppState {
    pub fn new(pool: PgPool, templates_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            tenant_config: TenantConfigLoader::new(pool.clone(), templates_dir),
            task_registry: TaskRegistry::new(pool.clone()),
            dashboard: DashboardAggregator::new(pool.clone()),
            pool,
        }
    }
}

// ============================================================================
// Module: core/src/state.rs
// Description: Shared application state injected into every handler
// ============================================================================

use std::sync::Arc;

use invoice_shared::config::AppConfig;
use invoice_shared::database::DbPool;

use crate::services::object_store::ObjectStore;
use crate::services::vision_extractor::VisionExtractor;

/// Analogous to the teacher's `CommerceConfig`: one struct threaded through
/// `Router::with_state`, cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub object_store: Arc<dyn ObjectStore>,
    pub vision: Arc<VisionExtractor>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        object_store: Arc<dyn ObjectStore>,
        vision: Arc<VisionExtractor>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { pool, object_store, vision, config }
    }

    pub fn bucket(&self) -> &str {
        &self.config.object_store.bucket
    }
}

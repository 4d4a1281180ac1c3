// ============================================================================
// Module: shared/src/models/tenant.rs
// Description: Tenant entity (spec §3)
// ============================================================================

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::TenantScoped;

/// A tenant, keyed by username. Created out-of-band (no create/update
/// operation exists inside this core per spec §3: "Created out-of-band;
/// immutable inside the core") — the row is read-only from this crate's
/// perspective; `invoice_platform`'s Tenant Config Loader (C5) is what
/// merges the industry template with `column_map`/`extraction_prompt`
/// overrides at load time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub username: String,
    pub industry_kind: String,
    pub object_store_bucket: String,
    pub extraction_prompt: String,
    pub column_map: serde_json::Value,
    pub external_sheet_id: Option<String>,
}

impl TenantScoped for Tenant {
    fn tenant(&self) -> &str {
        &self.username
    }
}

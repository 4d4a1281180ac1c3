// ============================================================================
// Module: shared/src/models/mod.rs
// Description: Domain models shared across invoice-auth/platform/core
// ============================================================================

pub mod purchase_order;
pub mod staging;
pub mod stock;
pub mod task;
pub mod tenant;
pub mod verification;

pub use purchase_order::{DraftPOLine, PurchaseOrder, PurchaseOrderItem};
pub use staging::{normalize_numeric_field, NumericField, StagingInvoice, StagingVendorLine};
pub use stock::{Priority, StockLevel, VendorMappingEntry};
pub use task::{RecalculationTask, TaskProgress, TaskStatus, UploadKind, UploadTask};
pub use tenant::Tenant;
pub use verification::{VerificationHeader, VerificationLine, VerificationStatus, VerifiedInvoice};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Base audit fields most entities carry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditFields {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditFields {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for AuditFields {
    fn default() -> Self {
        Self::new()
    }
}

/// Pagination parameters for list queries. The database adapter's
/// paginated-fetch fast-path (spec §4.4) applies when `limit` is within
/// `PAGINATED_FETCH_HARD_CAP`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaginationParams {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: Some(100),
            offset: Some(0),
        }
    }
}

/// Pagination response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub records: Vec<T>,
    pub total: i64,
}

/// Common database result type
pub type DbResult<T> = Result<T, sqlx::Error>;

/// Entities partitioned by tenant username (spec §5: "all queries MUST
/// filter by tenant").
pub trait TenantScoped {
    fn tenant(&self) -> &str;
    fn belongs_to(&self, tenant: &str) -> bool {
        self.tenant() == tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_params_default() {
        let params = PaginationParams::default();
        assert_eq!(params.limit, Some(100));
        assert_eq!(params.offset, Some(0));
    }

    #[test]
    fn test_pagination_validation() {
        let mut params = PaginationParams::default();
        params.limit = Some(5000); // over the adapter's hard cap
        assert!(params.validate().is_err());
    }
}

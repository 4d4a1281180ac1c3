// ============================================================================
// Module: shared/src/models/purchase_order.rs
// Description: Draft basket and finalized purchase-order entities (C11)
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{stock::Priority, TenantScoped};

/// A pending reorder line in the per-tenant draft basket, spec §3.
/// Invariant: `qty > 0`; a negative true stock is folded into a
/// `[Backorder: N]` note rather than stored as a negative quantity (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DraftPOLine {
    pub tenant: String,
    pub part_number: String,
    pub quantity: i64,
    pub unit_value: Decimal,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

impl TenantScoped for DraftPOLine {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// A finalized, immutable line-item snapshot inside a `PurchaseOrder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub part_number: String,
    pub description: Option<String>,
    pub stock: i64,
    pub reorder_point: Option<i64>,
    pub quantity: i64,
    pub unit_value: Decimal,
    pub line_total: Decimal,
}

/// Finalized purchase order, spec §3/§4.11. `po_number` follows
/// `{first-2-of-tenant upper}{YYYYMMDD}{001}`, incremented against existing
/// numbers sharing the same `{prefix}{YYYYMMDD}` family.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub tenant: String,
    pub po_number: String,
    #[sqlx(json)]
    pub line_items: sqlx::types::Json<Vec<PurchaseOrderItem>>,
    pub supplier_name: Option<String>,
    pub notes: Option<String>,
    pub total_cost: Decimal,
    pub pdf_file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Build the `{prefix}{YYYYMMDD}` family used to derive the next
    /// sequence number, spec §4.11.
    pub fn number_family(tenant: &str, date: chrono::NaiveDate) -> String {
        let prefix: String = tenant.chars().take(2).collect::<String>().to_uppercase();
        format!("{}{}", prefix, date.format("%Y%m%d"))
    }

    /// Given existing po_numbers sharing `family`, compute the next
    /// 3-digit sequence suffix, starting at 001.
    pub fn next_sequence(family: &str, existing_numbers: &[String]) -> u32 {
        existing_numbers
            .iter()
            .filter_map(|n| n.strip_prefix(family))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .max()
            .map(|n| n + 1)
            .unwrap_or(1)
    }
}

impl TenantScoped for PurchaseOrder {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn number_family_uses_tenant_prefix_and_date() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        assert_eq!(PurchaseOrder::number_family("acme", date), "AC20260730");
    }

    #[test]
    fn next_sequence_starts_at_one() {
        assert_eq!(PurchaseOrder::next_sequence("AC20260730", &[]), 1);
    }

    #[test]
    fn next_sequence_increments_past_existing() {
        let existing = vec!["AC20260730001".to_string(), "AC20260730002".to_string()];
        assert_eq!(PurchaseOrder::next_sequence("AC20260730", &existing), 3);
    }
}

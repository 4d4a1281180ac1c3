// ============================================================================
// Module: platform/src/models.rs
// Description: Tenant config, task registry, and dashboard DTOs (C5/C7/C13)
// ============================================================================

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One column's presentation metadata within a section of the extraction
/// schema (e.g. `invoice_all`, `verify_dates`), spec §4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub db_column: String,
    pub label: String,
}

/// An industry-level template, shared across every tenant of that
/// `industry_kind` until a tenant overrides part of it, spec §4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryTemplate {
    pub industry_kind: String,
    pub extraction_prompt: String,
    pub columns: HashMap<String, Vec<ColumnDef>>,
}

/// The result of merging a tenant's row onto its industry template —
/// what callers (vision extraction, review UIs) actually consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedTenantConfig {
    pub username: String,
    pub industry_kind: String,
    pub object_store_bucket: String,
    pub extraction_prompt: String,
    pub columns: HashMap<String, Vec<ColumnDef>>,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub verified_invoice_count: i64,
    pub total_vendor_spend: rust_decimal::Decimal,
    pub total_sales_revenue: rust_decimal::Decimal,
    pub stock_valuation: rust_decimal::Decimal,
    pub low_stock_part_count: i64,
    pub backorder_part_count: i64,
}

#[derive(Debug, Deserialize)]
pub enum DashboardMetric {
    #[serde(rename = "sales_revenue")]
    SalesRevenue,
    #[serde(rename = "vendor_spend")]
    VendorSpend,
}

#[derive(Debug, Deserialize)]
pub enum DashboardBucket {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
}

#[derive(Debug, Serialize)]
pub struct TimeSeriesPoint {
    pub bucket_start: NaiveDate,
    pub value: rust_decimal::Decimal,
}

#[derive(Debug, Serialize)]
pub struct StockAlert {
    pub part_number: String,
    pub current_stock: i64,
    pub reorder_point: Option<i64>,
    pub kind: StockAlertKind,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub enum StockAlertKind {
    LowStock,
    Backorder,
}

#[derive(Debug, Serialize)]
pub struct StaleReceiptAlert {
    pub header_id: Uuid,
    pub receipt_number: String,
    pub pending_since: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct DashboardAlerts {
    pub stock: Vec<StockAlert>,
    pub stale_receipts: Vec<StaleReceiptAlert>,
}

// ============================================================================
// Module: platform/src/services/dashboard.rs
// Description: Dashboard Aggregator (C13), spec §4.13
// ============================================================================

use chrono::{Duration, NaiveDate, Utc};
use invoice_shared::error::Result;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{DashboardAlerts, DashboardBucket, DashboardMetric, DashboardSummary, StaleReceiptAlert, StockAlert, StockAlertKind, TimeSeriesPoint};

/// Read-only KPIs over `VerifiedInvoice`/`StockLevel`/`PurchaseOrder`.
/// Grounded on `original_source/backend/routes/dashboard_routes.py`
/// (spec.md names C13 in its component table but never details it;
/// SPEC_FULL.md §4.13 expands from that file). No write paths, no
/// cross-tenant aggregation.
pub struct DashboardAggregator {
    pool: PgPool,
}

impl DashboardAggregator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn summary(&self, tenant: &str) -> Result<DashboardSummary> {
        let (verified_invoice_count, total_sales_revenue): (i64, Option<Decimal>) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM verified_invoices WHERE tenant = $1",
        )
        .bind(tenant)
        .fetch_one(&self.pool)
        .await?;

        let (total_vendor_spend,): (Option<Decimal>,) = sqlx::query_as(
            "SELECT COALESCE(SUM(net_bill), 0) FROM staging_vendor_lines WHERE tenant = $1 AND NOT excluded_from_stock",
        )
        .bind(tenant)
        .fetch_one(&self.pool)
        .await?;

        let (stock_valuation,): (Option<Decimal>,) =
            sqlx::query_as("SELECT COALESCE(SUM(total_value), 0) FROM stock_levels WHERE tenant = $1")
                .bind(tenant)
                .fetch_one(&self.pool)
                .await?;

        let (low_stock_part_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM stock_levels WHERE tenant = $1 AND reorder_point IS NOT NULL AND current_stock <= reorder_point",
        )
        .bind(tenant)
        .fetch_one(&self.pool)
        .await?;

        let (backorder_part_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM stock_levels WHERE tenant = $1 AND current_stock < 0")
                .bind(tenant)
                .fetch_one(&self.pool)
                .await?;

        Ok(DashboardSummary {
            verified_invoice_count,
            total_vendor_spend: total_vendor_spend.unwrap_or_default(),
            total_sales_revenue: total_sales_revenue.unwrap_or_default(),
            stock_valuation: stock_valuation.unwrap_or_default(),
            low_stock_part_count,
            backorder_part_count,
        })
    }

    pub async fn time_series(
        &self,
        tenant: &str,
        metric: DashboardMetric,
        bucket: DashboardBucket,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let trunc = match bucket {
            DashboardBucket::Daily => "day",
            DashboardBucket::Weekly => "week",
        };

        let rows: Vec<(NaiveDate, Decimal)> = match metric {
            DashboardMetric::SalesRevenue => {
                sqlx::query_as(&format!(
                    "SELECT date_trunc('{trunc}', date)::date AS bucket_start, COALESCE(SUM(amount), 0)
                     FROM verified_invoices
                     WHERE tenant = $1 AND date BETWEEN $2 AND $3
                     GROUP BY bucket_start ORDER BY bucket_start"
                ))
                .bind(tenant)
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await?
            }
            DashboardMetric::VendorSpend => {
                sqlx::query_as(&format!(
                    "SELECT date_trunc('{trunc}', created_at)::date AS bucket_start, COALESCE(SUM(net_bill), 0)
                     FROM staging_vendor_lines
                     WHERE tenant = $1 AND created_at::date BETWEEN $2 AND $3
                     GROUP BY bucket_start ORDER BY bucket_start"
                ))
                .bind(tenant)
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|(bucket_start, value)| TimeSeriesPoint { bucket_start, value }).collect())
    }

    pub async fn alerts(&self, tenant: &str, stale_after: Duration) -> Result<DashboardAlerts> {
        let rows: Vec<(String, i64, Option<i64>)> = sqlx::query_as(
            "SELECT part_number, current_stock, reorder_point FROM stock_levels
             WHERE tenant = $1 AND (current_stock < 0 OR (reorder_point IS NOT NULL AND current_stock <= reorder_point))",
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        let stock = rows
            .into_iter()
            .map(|(part_number, current_stock, reorder_point)| StockAlert {
                kind: if current_stock < 0 { StockAlertKind::Backorder } else { StockAlertKind::LowStock },
                part_number,
                current_stock,
                reorder_point,
            })
            .collect();

        let cutoff = Utc::now() - stale_after;
        let stale_rows: Vec<(Uuid, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, receipt_number, created_at FROM verification_headers
             WHERE tenant = $1 AND status = 'Pending' AND created_at < $2",
        )
        .bind(tenant)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let stale_receipts = stale_rows
            .into_iter()
            .map(|(header_id, receipt_number, pending_since)| StaleReceiptAlert { header_id, receipt_number, pending_since })
            .collect();

        Ok(DashboardAlerts { stock, stale_receipts })
    }
}

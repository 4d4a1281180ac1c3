// ============================================================================
// Module: core/src/stock_engine.rs
// Description: Per-tenant stock recalculation (C10)
// ============================================================================

use std::collections::HashMap;

use invoice_shared::database::AdvisoryLock;
use invoice_shared::error::Result;
use invoice_shared::models::stock::{StockLevel, VendorMappingEntry};
use invoice_shared::models::staging::StagingVendorLine;
use invoice_shared::models::verification::VerifiedInvoice;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

/// Fields preserved from the existing `StockLevel` row across a
/// recalculation, spec §4.10 step 3.
#[derive(Debug, Clone, Default)]
struct PreservedFields {
    manual_adjustment: i64,
    old_stock: Option<i64>,
    priority: Option<invoice_shared::models::stock::Priority>,
    reorder_point: Option<i64>,
    customer_items: Vec<String>,
    internal_item_name: Option<String>,
    unit_value: Option<Decimal>,
}

/// Resolves a sales-side description/customer reference to a canonical
/// `part_number` via vendor descriptions or customer-item aliases, spec
/// §4.10 step 2.
fn resolve_part_number(reference: &str, mappings: &[VendorMappingEntry]) -> Option<String> {
    mappings
        .iter()
        .find(|m| {
            m.vendor_descriptions.0.iter().any(|d| d.eq_ignore_ascii_case(reference))
                || m.customer_item_aliases.0.iter().any(|a| a.eq_ignore_ascii_case(reference))
        })
        .map(|m| m.part_number.clone())
}

/// Pure computation over in-memory inputs, isolated from I/O so it can be
/// unit-tested without a database.
pub fn compute_levels(
    vendor_lines: &[StagingVendorLine],
    verified_invoices: &[VerifiedInvoice],
    mappings: &[VendorMappingEntry],
    existing: &HashMap<String, StockLevel>,
) -> Vec<StockLevel> {
    let mut inflow: HashMap<String, i64> = HashMap::new();
    let mut latest_rate: HashMap<String, Decimal> = HashMap::new();

    for line in vendor_lines {
        if line.excluded_from_stock {
            continue;
        }
        let Some(part_number) = &line.part_number else { continue };
        let qty = line.quantity.unwrap_or(0);
        *inflow.entry(part_number.clone()).or_insert(0) += qty;
        if let Some(rate) = line.rate {
            latest_rate.insert(part_number.clone(), rate);
        }
    }

    let mut outflow: HashMap<String, i64> = HashMap::new();
    for invoice in verified_invoices {
        let reference = invoice
            .description
            .as_deref()
            .or(invoice.customer.as_deref())
            .unwrap_or("");
        if reference.is_empty() {
            continue;
        }

        let part_number = if inflow.contains_key(reference) {
            Some(reference.to_string())
        } else {
            resolve_part_number(reference, mappings)
        };

        if let Some(part_number) = part_number {
            *outflow.entry(part_number).or_insert(0) += invoice.quantity.unwrap_or(0);
        }
    }

    let mut part_numbers: std::collections::HashSet<String> = inflow.keys().cloned().collect();
    part_numbers.extend(outflow.keys().cloned());
    part_numbers.extend(existing.keys().cloned());

    part_numbers
        .into_iter()
        .filter_map(|part_number| {
            let has_vendor = inflow.contains_key(&part_number);
            let has_sales = outflow.contains_key(&part_number);
            if !has_vendor && !has_sales {
                return None;
            }

            let preserved = existing.get(&part_number).map(|level| PreservedFields {
                manual_adjustment: level.manual_adjustment,
                old_stock: level.old_stock,
                priority: level.priority,
                reorder_point: level.reorder_point,
                customer_items: level.customer_items.0.clone(),
                internal_item_name: level.internal_item_name.clone(),
                unit_value: level.unit_value,
            }).unwrap_or_default();

            let current_stock =
                inflow.get(&part_number).copied().unwrap_or(0) - outflow.get(&part_number).copied().unwrap_or(0);

            let unit_value = preserved
                .unit_value
                .or_else(|| latest_rate.get(&part_number).copied());

            let total_value = unit_value
                .map(|uv| Decimal::from(current_stock + preserved.manual_adjustment) * uv)
                .unwrap_or(Decimal::ZERO);

            Some(StockLevel {
                tenant: vendor_lines
                    .first()
                    .map(|l| l.tenant.clone())
                    .or_else(|| verified_invoices.first().map(|v| v.tenant.clone()))
                    .unwrap_or_default(),
                part_number,
                internal_item_name: preserved.internal_item_name,
                priority: preserved.priority,
                reorder_point: preserved.reorder_point,
                current_stock,
                manual_adjustment: preserved.manual_adjustment,
                old_stock: preserved.old_stock,
                unit_value,
                total_value,
                customer_items: sqlx::types::Json(preserved.customer_items),
            })
        })
        .collect()
}

/// Stock recalculation engine (C10), serialized per tenant via the advisory
/// lock RPC described in spec §4.4.
pub struct StockEngine {
    pool: PgPool,
}

impl StockEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `recalculate(tenant)`, spec §4.10. Acquires the tenant's advisory
    /// lock before any read and releases it on every exit path.
    pub async fn recalculate(&self, tenant: &str) -> Result<Vec<StockLevel>> {
        let lock = AdvisoryLock::new(self.pool.clone());
        let guard = lock.acquire(tenant).await?;

        let result = self.recalculate_locked(tenant).await;

        guard.release().await?;
        result
    }

    async fn recalculate_locked(&self, tenant: &str) -> Result<Vec<StockLevel>> {
        info!(tenant, "recalculating stock levels");

        let vendor_lines: Vec<StagingVendorLine> = sqlx::query_as(
            "SELECT * FROM staging_vendor_lines WHERE tenant = $1 AND excluded_from_stock = false",
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        let verified_invoices: Vec<VerifiedInvoice> =
            sqlx::query_as("SELECT * FROM verified_invoices WHERE tenant = $1")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;

        let mappings: Vec<VendorMappingEntry> =
            sqlx::query_as("SELECT * FROM vendor_mapping_entries WHERE tenant = $1")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;

        let existing_rows: Vec<StockLevel> =
            sqlx::query_as("SELECT * FROM stock_levels WHERE tenant = $1")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;
        let existing: HashMap<String, StockLevel> = existing_rows
            .into_iter()
            .map(|level| (level.part_number.clone(), level))
            .collect();

        let levels = compute_levels(&vendor_lines, &verified_invoices, &mappings, &existing);

        let surviving: std::collections::HashSet<&str> =
            levels.iter().map(|l| l.part_number.as_str()).collect();
        let to_delete: Vec<String> = existing
            .keys()
            .filter(|part_number| !surviving.contains(part_number.as_str()))
            .cloned()
            .collect();

        let mut tx = self.pool.begin().await?;

        for level in &levels {
            sqlx::query(
                r#"
                INSERT INTO stock_levels
                    (tenant, part_number, internal_item_name, priority, reorder_point,
                     current_stock, manual_adjustment, old_stock, unit_value, total_value, customer_items)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (tenant, part_number) DO UPDATE SET
                    internal_item_name = EXCLUDED.internal_item_name,
                    priority = EXCLUDED.priority,
                    reorder_point = EXCLUDED.reorder_point,
                    current_stock = EXCLUDED.current_stock,
                    manual_adjustment = EXCLUDED.manual_adjustment,
                    old_stock = EXCLUDED.old_stock,
                    unit_value = EXCLUDED.unit_value,
                    total_value = EXCLUDED.total_value,
                    customer_items = EXCLUDED.customer_items
                "#,
            )
            .bind(&level.tenant)
            .bind(&level.part_number)
            .bind(&level.internal_item_name)
            .bind(level.priority)
            .bind(level.reorder_point)
            .bind(level.current_stock)
            .bind(level.manual_adjustment)
            .bind(level.old_stock)
            .bind(level.unit_value)
            .bind(level.total_value)
            .bind(&level.customer_items)
            .execute(&mut *tx)
            .await?;
        }

        for part_number in &to_delete {
            sqlx::query("DELETE FROM stock_levels WHERE tenant = $1 AND part_number = $2")
                .bind(tenant)
                .bind(part_number)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(tenant, updated = levels.len(), deleted = to_delete.len(), "stock recalculation complete");
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use invoice_shared::models::stock::Priority;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn vendor_line(part_number: &str, qty: i64, rate: Decimal) -> StagingVendorLine {
        StagingVendorLine {
            id: Uuid::new_v4(),
            row_id: format!("{part_number}_1"),
            tenant: "acme".to_string(),
            part_number: Some(part_number.to_string()),
            batch: None,
            hsn: None,
            description: None,
            quantity: Some(qty),
            rate: Some(rate),
            taxable_amount: None,
            discount_percent: None,
            cgst_percent: None,
            sgst_percent: None,
            discounted_price: None,
            taxed_amount: None,
            net_bill: None,
            amount_mismatch: None,
            excluded_from_stock: false,
            blob_key: "key".to_string(),
            image_hash: "hash".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn verified_invoice(description: &str, qty: i64) -> VerifiedInvoice {
        VerifiedInvoice {
            row_id: format!("{description}_1"),
            tenant: "acme".to_string(),
            receipt_number: Some("R1".to_string()),
            date: None,
            customer: None,
            vehicle: None,
            description: Some(description.to_string()),
            quantity: Some(qty),
            rate: None,
            amount: None,
            blob_key: None,
            image_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn current_stock_is_inflow_minus_outflow() {
        let vendor_lines = vec![vendor_line("P-1", 100, dec!(10))];
        let invoices = vec![verified_invoice("P-1", 30)];
        let existing = HashMap::new();

        let levels = compute_levels(&vendor_lines, &invoices, &[], &existing);
        let level = levels.iter().find(|l| l.part_number == "P-1").unwrap();
        assert_eq!(level.current_stock, 70);
    }

    #[test]
    fn alias_resolves_sales_reference_to_part_number() {
        let vendor_lines = vec![vendor_line("P-1", 50, dec!(5))];
        let invoices = vec![verified_invoice("Customer Widget", 10)];
        let mappings = vec![VendorMappingEntry {
            tenant: "acme".to_string(),
            part_number: "P-1".to_string(),
            vendor_descriptions: sqlx::types::Json(vec![]),
            customer_item_aliases: sqlx::types::Json(vec!["Customer Widget".to_string()]),
        }];

        let levels = compute_levels(&vendor_lines, &invoices, &mappings, &HashMap::new());
        let level = levels.iter().find(|l| l.part_number == "P-1").unwrap();
        assert_eq!(level.current_stock, 40);
    }

    #[test]
    fn manual_adjustment_and_priority_are_preserved() {
        let mut existing = HashMap::new();
        existing.insert(
            "P-1".to_string(),
            StockLevel {
                tenant: "acme".to_string(),
                part_number: "P-1".to_string(),
                internal_item_name: Some("Widget".to_string()),
                priority: Some(Priority::P2),
                reorder_point: Some(5),
                current_stock: 0,
                manual_adjustment: -3,
                old_stock: Some(12),
                unit_value: Some(dec!(9.99)),
                total_value: Decimal::ZERO,
                customer_items: sqlx::types::Json(vec!["alias".to_string()]),
            },
        );

        let vendor_lines = vec![vendor_line("P-1", 100, dec!(1))];
        let levels = compute_levels(&vendor_lines, &[], &[], &existing);
        let level = levels.iter().find(|l| l.part_number == "P-1").unwrap();

        assert_eq!(level.manual_adjustment, -3);
        assert_eq!(level.priority, Some(Priority::P2));
        assert_eq!(level.unit_value, Some(dec!(9.99)));
        assert_eq!(level.total_value, Decimal::from(100 - 3) * dec!(9.99));
    }

    #[test]
    fn parts_with_no_remaining_rows_are_absent() {
        let mut existing = HashMap::new();
        existing.insert(
            "P-gone".to_string(),
            StockLevel {
                tenant: "acme".to_string(),
                part_number: "P-gone".to_string(),
                internal_item_name: None,
                priority: None,
                reorder_point: None,
                current_stock: 5,
                manual_adjustment: 0,
                old_stock: None,
                unit_value: None,
                total_value: Decimal::ZERO,
                customer_items: sqlx::types::Json(vec![]),
            },
        );

        let levels = compute_levels(&[], &[], &[], &existing);
        assert!(levels.is_empty());
    }
}

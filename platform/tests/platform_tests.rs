// ============================================================================
// Module: platform/tests/platform_tests.rs
// Description: Integration tests for the tenant config loader, task registry,
// and dashboard aggregator against a real Postgres schema
// ============================================================================

use chrono::{Duration, NaiveDate};
use invoice_platform::models::{DashboardBucket, DashboardMetric};
use invoice_platform::services::{DashboardAggregator, TaskRegistry, TenantConfigLoader};
use sqlx::PgPool;
use uuid::Uuid;

fn templates_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
}

async fn seed_tenant(pool: &PgPool, username: &str, industry_kind: &str, column_map: serde_json::Value, extraction_prompt: &str) {
    sqlx::query(
        "INSERT INTO tenants (username, industry_kind, object_store_bucket, extraction_prompt, column_map)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(username)
    .bind(industry_kind)
    .bind(format!("{username}-bucket"))
    .bind(extraction_prompt)
    .bind(column_map)
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "../migrations")]
async fn tenant_config_merges_template_with_column_overrides(pool: PgPool) {
    seed_tenant(
        &pool,
        "Acme",
        "auto_parts",
        serde_json::json!({"amount": "Total (INR)"}),
        "",
    )
    .await;

    let loader = TenantConfigLoader::new(pool, templates_dir());
    let merged = loader.load("Acme", false).await.unwrap();

    assert_eq!(merged.industry_kind, "auto_parts");
    assert_eq!(merged.object_store_bucket, "Acme-bucket");
    // Empty tenant prompt falls back to the template's.
    assert!(merged.extraction_prompt.contains("automobile service invoice"));

    let amount_column = merged.columns["invoice_all"].iter().find(|c| c.db_column == "amount").unwrap();
    assert_eq!(amount_column.label, "Total (INR)");
    let untouched_column = merged.columns["invoice_all"].iter().find(|c| c.db_column == "receipt_number").unwrap();
    assert_eq!(untouched_column.label, "Receipt #");
}

#[sqlx::test(migrations = "../migrations")]
async fn tenant_config_lookup_falls_back_to_lowercase(pool: PgPool) {
    seed_tenant(&pool, "acme", "auto_parts", serde_json::json!({}), "").await;

    let loader = TenantConfigLoader::new(pool, templates_dir());
    let merged = loader.load("ACME", false).await.unwrap();
    assert_eq!(merged.username, "acme");
}

#[sqlx::test(migrations = "../migrations")]
async fn tenant_config_prompt_override_replaces_template(pool: PgPool) {
    seed_tenant(&pool, "acme", "auto_parts", serde_json::json!({}), "Extract only the part number and quantity.").await;

    let loader = TenantConfigLoader::new(pool, templates_dir());
    let merged = loader.load("acme", false).await.unwrap();
    assert_eq!(merged.extraction_prompt, "Extract only the part number and quantity.");
}

#[sqlx::test(migrations = "../migrations")]
async fn unknown_tenant_is_not_found(pool: PgPool) {
    let loader = TenantConfigLoader::new(pool, templates_dir());
    assert!(loader.load("nobody", false).await.is_err());
}

#[sqlx::test(migrations = "../migrations")]
async fn task_registry_tracks_recalculation_lifecycle(pool: PgPool) {
    let registry = TaskRegistry::new(pool);

    let task = registry.create_recalculation_task("acme").await.unwrap();
    assert_eq!(task.status, invoice_shared::models::task::TaskStatus::Queued);

    registry.mark_completed(task.task_id).await.unwrap();
    let status = registry.status("acme", task.task_id).await.unwrap().unwrap();
    assert_eq!(status.status, invoice_shared::models::task::TaskStatus::Completed);

    let recent = registry.most_recent("acme").await.unwrap().unwrap();
    assert_eq!(recent.task_id, task.task_id);
}

#[sqlx::test(migrations = "../migrations")]
async fn task_registry_records_failure_message(pool: PgPool) {
    let registry = TaskRegistry::new(pool);
    let task = registry.create_recalculation_task("acme").await.unwrap();

    registry.mark_failed(task.task_id, "stock engine panicked").await.unwrap();

    let status = registry.status("acme", task.task_id).await.unwrap().unwrap();
    assert_eq!(status.status, invoice_shared::models::task::TaskStatus::Failed);
    assert_eq!(status.message.as_deref(), Some("stock engine panicked"));
}

#[sqlx::test(migrations = "../migrations")]
async fn task_registry_scopes_status_lookup_by_tenant(pool: PgPool) {
    let registry = TaskRegistry::new(pool);
    let task = registry.create_recalculation_task("acme").await.unwrap();

    assert!(registry.status("other-tenant", task.task_id).await.unwrap().is_none());
}

async fn seed_verified_invoice(pool: &PgPool, tenant: &str, date: NaiveDate, amount: i64) {
    sqlx::query(
        "INSERT INTO verified_invoices (row_id, tenant, receipt_number, date, amount, image_hash)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant)
    .bind("R-1")
    .bind(date)
    .bind(rust_decimal::Decimal::from(amount))
    .bind("hash")
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_stock_level(pool: &PgPool, tenant: &str, part_number: &str, current_stock: i64, reorder_point: Option<i64>) {
    sqlx::query(
        "INSERT INTO stock_levels (tenant, part_number, current_stock, reorder_point, total_value)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(tenant)
    .bind(part_number)
    .bind(current_stock)
    .bind(reorder_point)
    .bind(rust_decimal::Decimal::from(current_stock * 10))
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "../migrations")]
async fn dashboard_summary_aggregates_sales_and_stock(pool: PgPool) {
    seed_verified_invoice(&pool, "acme", NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(), 100).await;
    seed_verified_invoice(&pool, "acme", NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(), 50).await;
    seed_stock_level(&pool, "acme", "P-1", 2, Some(5)).await;
    seed_stock_level(&pool, "acme", "P-2", -3, None).await;

    let aggregator = DashboardAggregator::new(pool);
    let summary = aggregator.summary("acme").await.unwrap();

    assert_eq!(summary.verified_invoice_count, 2);
    assert_eq!(summary.total_sales_revenue, rust_decimal::Decimal::from(150));
    assert_eq!(summary.low_stock_part_count, 1);
    assert_eq!(summary.backorder_part_count, 1);
}

#[sqlx::test(migrations = "../migrations")]
async fn dashboard_time_series_buckets_sales_revenue_daily(pool: PgPool) {
    seed_verified_invoice(&pool, "acme", NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(), 100).await;
    seed_verified_invoice(&pool, "acme", NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(), 25).await;
    seed_verified_invoice(&pool, "acme", NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(), 40).await;

    let aggregator = DashboardAggregator::new(pool);
    let series = aggregator
        .time_series(
            "acme",
            DashboardMetric::SalesRevenue,
            DashboardBucket::Daily,
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 2);
    assert_eq!(series[0].value, rust_decimal::Decimal::from(125));
    assert_eq!(series[1].value, rust_decimal::Decimal::from(40));
}

#[sqlx::test(migrations = "../migrations")]
async fn dashboard_alerts_flag_low_stock_backorder_and_stale_receipts(pool: PgPool) {
    seed_stock_level(&pool, "acme", "P-1", 1, Some(10)).await;
    seed_stock_level(&pool, "acme", "P-2", -1, None).await;
    seed_stock_level(&pool, "acme", "P-3", 20, Some(5)).await;

    sqlx::query(
        "INSERT INTO verification_headers (id, row_id, tenant, receipt_number, status, created_at)
         VALUES ($1, $2, $3, $4, 'Pending', now() - interval '3 days')",
    )
    .bind(Uuid::new_v4())
    .bind("row-1")
    .bind("acme")
    .bind("R-STALE")
    .execute(&pool)
    .await
    .unwrap();

    let aggregator = DashboardAggregator::new(pool);
    let alerts = aggregator.alerts("acme", Duration::hours(48)).await.unwrap();

    assert_eq!(alerts.stock.len(), 2);
    assert_eq!(alerts.stale_receipts.len(), 1);
    assert_eq!(alerts.stale_receipts[0].receipt_number, "R-STALE");
}

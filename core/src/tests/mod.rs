// ============================================================================
// Module: core/src/tests/mod.rs
// Description: Crate-level integration tests against a real Postgres schema
// ============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use invoice_shared::config::IngestionConfig;
use invoice_shared::error::Result;
use invoice_shared::models::task::{TaskStatus, UploadKind, UploadTask};
use sqlx::PgPool;

use crate::services::ingestion::{IngestionPipeline, PipelineKind};
use crate::services::object_store::ObjectStore;
use crate::services::purchase_order::PurchaseOrderWorkflow;
use crate::services::stock_engine::StockEngine;
use crate::services::vision_extractor::VisionExtractor;

/// In-memory object store double, grounded on the teacher's
/// `MockEventPublisher` pattern in `commerce/src/tests/inventory_tests.rs`.
struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    fn new() -> Self {
        Self { objects: Mutex::new(HashMap::new()) }
    }

    fn seed(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, _bucket: &str, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, _bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| invoice_shared::error::Error::ObjectStore(format!("missing key {key}")))
    }

    async fn delete(&self, _bucket: &str, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, _bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self.objects.lock().unwrap().keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn public_url(&self, _bucket: &str, key: &str) -> String {
        format!("memory://{key}")
    }
}

fn test_vision() -> Arc<VisionExtractor> {
    Arc::new(VisionExtractor::new(invoice_shared::config::AppConfig::default().vision))
}

/// S-3: a second upload whose content hash matches an already-staged row is
/// reported as a duplicate instead of re-extracted, spec §4.8.2.
#[sqlx::test(migrations = "../migrations")]
async fn duplicate_gate_short_circuits_before_extraction(pool: PgPool) {
    let store = Arc::new(InMemoryObjectStore::new());
    store.seed("acme/sales/one.jpg", b"same-bytes".to_vec());

    sqlx::query(
        "INSERT INTO staging_invoices (id, row_id, tenant, blob_key, image_hash) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(uuid::Uuid::new_v4())
    .bind("existing_row")
    .bind("acme")
    .bind("acme/sales/already-there.jpg")
    .bind(crate::services::content_hash::hash_upload(b"same-bytes"))
    .execute(&pool)
    .await
    .unwrap();

    let pipeline = IngestionPipeline::new(pool.clone(), store.clone(), test_vision(), IngestionConfig::default());
    let mut task = UploadTask::new("acme".to_string(), UploadKind::Sales);

    pipeline
        .process_batch(
            "acme",
            "bucket",
            PipelineKind::Sales,
            vec!["acme/sales/one.jpg".to_string()],
            false,
            &mut task,
            crate::services::ingestion::SALES_SYSTEM_PROMPT,
        )
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::DuplicateDetected);
    assert_eq!(task.duplicates.0, vec!["acme/sales/one.jpg".to_string()]);
}

/// S-5: two vendor batches land concurrently; the advisory lock serializes
/// `recalculate` so the final stock reflects both batches, not a lost update.
#[sqlx::test(migrations = "../migrations")]
async fn concurrent_recalculation_serializes_without_losing_updates(pool: PgPool) {
    seed_vendor_line(&pool, "acme", "P-1", 10).await;

    let engine_a = StockEngine::new(pool.clone());
    let engine_b = StockEngine::new(pool.clone());

    let (result_a, result_b) = tokio::join!(engine_a.recalculate("acme"), engine_b.recalculate("acme"));
    result_a.unwrap();
    result_b.unwrap();

    let level: (i64,) = sqlx::query_as("SELECT current_stock FROM stock_levels WHERE tenant = $1 AND part_number = $2")
        .bind("acme")
        .bind("P-1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(level.0, 10);
}

async fn seed_vendor_line(pool: &PgPool, tenant: &str, part_number: &str, quantity: i64) {
    sqlx::query(
        r#"
        INSERT INTO staging_vendor_lines (id, row_id, tenant, part_number, quantity, rate, blob_key, image_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(format!("{part_number}_row"))
    .bind(tenant)
    .bind(part_number)
    .bind(quantity)
    .bind(rust_decimal_macros::dec!(10))
    .bind("blob")
    .bind("hash")
    .execute(pool)
    .await
    .unwrap();
}

/// S-6: finalizing a draft basket snapshots current stock, issues a
/// sequential `po_number`, and clears the basket, spec §4.11.
#[sqlx::test(migrations = "../migrations")]
async fn finalize_generates_po_number_and_clears_draft(pool: PgPool) {
    sqlx::query(
        r#"
        INSERT INTO stock_levels (tenant, part_number, internal_item_name, current_stock, unit_value, total_value)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind("acme")
    .bind("P-1")
    .bind("Widget")
    .bind(5_i64)
    .bind(rust_decimal_macros::dec!(12.5))
    .bind(rust_decimal_macros::dec!(62.5))
    .execute(&pool)
    .await
    .unwrap();

    let workflow = PurchaseOrderWorkflow::new(pool.clone());
    workflow.add_draft_line("acme", "P-1", 20).await.unwrap();

    let (order, pdf_bytes) = workflow.finalize("acme", Some("Acme Supply Co".to_string()), None).await.unwrap();

    assert!(order.po_number.starts_with("AC"));
    assert!(order.po_number.ends_with("001"));
    assert!(!pdf_bytes.is_empty());

    let remaining = workflow.draft_items("acme").await.unwrap();
    assert!(remaining.is_empty());
}

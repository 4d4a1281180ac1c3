// ============================================================================
// Module: core/src/services/ingestion.rs
// Description: Upload + processing pipeline (C8) — hardest subsystem
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use invoice_shared::config::IngestionConfig;
use invoice_shared::database::DbPool;
use invoice_shared::error::{Error, Result};
use invoice_shared::models::staging::{StagingInvoice, StagingVendorLine};
use invoice_shared::models::task::{TaskProgress, TaskStatus, UploadKind, UploadTask};
use invoice_shared::models::verification::{VerificationHeader, VerificationLine, VerificationStatus};
use tracing::{info, warn};
use uuid::Uuid;

use super::content_hash::hash_upload;
use super::image_optimizer;
use super::normalize;
use super::object_store::{build_key, ObjectStore, UploadKind as StoreKind};
use super::vision_extractor::{ExtractedItem, ExtractionKind, VisionExtractor};

/// Extraction system prompts, spec §4.6 ("task kind drives which prompt
/// fields are mandatory"). Kept as constants rather than config since they
/// describe a fixed schema, not a deployment-specific value.
pub const SALES_SYSTEM_PROMPT: &str =
    "Extract receipt_number, date, and line items (customer, vehicle, description, quantity, rate, amount, odometer) from this sales receipt image. Respond as JSON.";
pub const VENDOR_SYSTEM_PROMPT: &str =
    "Extract vendor_name, invoice receipt_number, and line items (part_number, batch, hsn, description, quantity, rate, taxable_amount, discount_percent, cgst_percent, sgst_percent) from this vendor bill image. Respond as JSON.";
pub const MAPPING_SYSTEM_PROMPT: &str =
    "Extract line items (part_number, vendor_description, customer_item_alias, priority, reorder_point, physical_count) from this handwritten parts mapping sheet. priority and reorder_point and physical_count may be handwritten and ambiguous (e.g. 'O' for not counted); transcribe the raw token as written. Respond as JSON.";

/// The two ingestion flavors, spec §4.8.2 step 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Sales,
    Vendor,
}

impl From<PipelineKind> for UploadKind {
    fn from(value: PipelineKind) -> Self {
        match value {
            PipelineKind::Sales => UploadKind::Sales,
            PipelineKind::Vendor => UploadKind::Purchase,
        }
    }
}

pub struct IngestionPipeline {
    pool: DbPool,
    object_store: Arc<dyn ObjectStore>,
    vision: Arc<VisionExtractor>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        pool: DbPool,
        object_store: Arc<dyn ObjectStore>,
        vision: Arc<VisionExtractor>,
        config: IngestionConfig,
    ) -> Self {
        Self { pool, object_store, vision, config }
    }

    /// §4.8.1: upload one batch sequentially on one worker to bound peak
    /// memory. Returns the keys of successfully stored files; a per-file put
    /// failure is logged and the remaining files still run.
    pub async fn upload_batch(
        &self,
        tenant: &str,
        bucket: &str,
        kind: PipelineKind,
        files: Vec<(String, Vec<u8>, String)>,
    ) -> Vec<String> {
        let store_kind = match kind {
            PipelineKind::Sales => StoreKind::Sales,
            PipelineKind::Vendor => StoreKind::Purchases,
        };

        let mut stored_keys = Vec::new();
        for (filename, raw_bytes, content_type) in files {
            match self.upload_one(tenant, bucket, store_kind, &filename, raw_bytes, &content_type).await {
                Ok(key) => stored_keys.push(key),
                Err(e) => warn!(filename, error = %e, "upload failed, continuing with remaining files"),
            }
        }

        stored_keys
    }

    async fn upload_one(
        &self,
        tenant: &str,
        bucket: &str,
        kind: StoreKind,
        filename: &str,
        raw_bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let optimized = image_optimizer::optimize(&raw_bytes, content_type)?;
        let key = build_key(tenant, kind, filename);
        self.object_store
            .put(bucket, &key, optimized.bytes, image_optimizer::OPTIMIZED_CONTENT_TYPE)
            .await?;
        Ok(key)
    }

    /// §4.8.2: dedup pre-scan followed by parallel processing. Mutates
    /// `task` in place to reflect progress/duplicates/status.
    pub async fn process_batch(
        &self,
        tenant: &str,
        bucket: &str,
        kind: PipelineKind,
        keys: Vec<String>,
        force_upload: bool,
        task: &mut UploadTask,
        system_prompt: &str,
    ) -> Result<()> {
        task.status = TaskStatus::Processing;
        task.progress.0.total = keys.len() as i32;

        if !force_upload {
            if let Some(duplicates) = self.scan_duplicates(tenant, &keys, bucket).await? {
                task.status = TaskStatus::DuplicateDetected;
                task.duplicates = sqlx::types::Json(duplicates);
                return Ok(());
            }
        }

        let worker_count = self.config.processing_pool;
        let results: Vec<Result<ProcessedFile>> = stream::iter(keys.into_iter())
            .map(|key| self.process_one(tenant, bucket, kind, key, force_upload, system_prompt))
            .buffer_unordered(worker_count)
            .collect()
            .await;

        let mut processed_any_vendor = false;
        for result in results {
            match result {
                Ok(file) => {
                    task.progress.0.processed += 1;
                    if kind == PipelineKind::Vendor && !file.vendor_lines.is_empty() {
                        processed_any_vendor = true;
                    }
                    self.persist_file(tenant, kind, file).await?;
                }
                Err(e) => {
                    task.progress.0.failed += 1;
                    task.message = Some(e.to_string());
                }
            }
        }

        task.status = TaskStatus::Completed;

        if processed_any_vendor {
            info!(tenant, "enqueuing stock recalculation after vendor batch");
        }

        Ok(())
    }

    /// Pre-scan gate: returns `Some(duplicate_keys)` if any key's content
    /// hash already exists for this tenant, spec §4.8.2.
    async fn scan_duplicates(&self, tenant: &str, keys: &[String], bucket: &str) -> Result<Option<Vec<String>>> {
        let hashes: Vec<(String, String)> = stream::iter(keys.iter())
            .map(|key| async move {
                let bytes = self.object_store.get(bucket, key).await?;
                Ok::<_, Error>((key.clone(), hash_upload(&bytes)))
            })
            .buffer_unordered(self.config.processing_pool)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let mut duplicates = Vec::new();
        for (key, hash) in &hashes {
            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT blob_key FROM staging_invoices WHERE tenant = $1 AND image_hash = $2
                 UNION SELECT blob_key FROM staging_vendor_lines WHERE tenant = $1 AND image_hash = $2
                 LIMIT 1",
            )
            .bind(tenant)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;

            if existing.is_some() {
                duplicates.push(key.clone());
            }
        }

        if duplicates.is_empty() {
            Ok(None)
        } else {
            Ok(Some(duplicates))
        }
    }

    async fn process_one(
        &self,
        tenant: &str,
        bucket: &str,
        kind: PipelineKind,
        key: String,
        force_upload: bool,
        system_prompt: &str,
    ) -> Result<ProcessedFile> {
        let bytes = self.object_store.get(bucket, &key).await?;
        let image_hash = hash_upload(&bytes);

        if force_upload {
            sqlx::query("DELETE FROM staging_invoices WHERE tenant = $1 AND image_hash = $2")
                .bind(tenant)
                .bind(&image_hash)
                .execute(&self.pool)
                .await?;
            sqlx::query("DELETE FROM staging_vendor_lines WHERE tenant = $1 AND image_hash = $2")
                .bind(tenant)
                .bind(&image_hash)
                .execute(&self.pool)
                .await?;
            sqlx::query("DELETE FROM verified_invoices WHERE tenant = $1 AND image_hash = $2")
                .bind(tenant)
                .bind(&image_hash)
                .execute(&self.pool)
                .await?;
        }

        let extraction_kind = match kind {
            PipelineKind::Sales => ExtractionKind::Sales,
            PipelineKind::Vendor => ExtractionKind::Vendor,
        };
        let extraction = self.vision.extract(&bytes, system_prompt, extraction_kind).await?;

        let mut sales_rows = Vec::new();
        let mut vendor_lines = Vec::new();

        match kind {
            PipelineKind::Sales => {
                let receipt_number = extraction.header.receipt_number.clone();
                for (idx, item) in extraction.items.iter().enumerate() {
                    sales_rows.push(build_sales_row(
                        tenant,
                        &key,
                        &image_hash,
                        receipt_number.as_deref(),
                        extraction.header.date.as_deref(),
                        idx,
                        item,
                    ));
                }
            }
            PipelineKind::Vendor => {
                let is_handwritten = extraction
                    .header
                    .field_confidence
                    .get("invoice_type")
                    .map(|c| *c < 50.0)
                    .unwrap_or(false);
                for (idx, item) in extraction.items.iter().enumerate() {
                    vendor_lines.push(build_vendor_line(
                        tenant,
                        &key,
                        &image_hash,
                        extraction.header.receipt_number.as_deref(),
                        idx,
                        item,
                        is_handwritten,
                    ));
                }
            }
        }

        Ok(ProcessedFile { key, sales_rows, vendor_lines })
    }

    async fn persist_file(&self, tenant: &str, kind: PipelineKind, file: ProcessedFile) -> Result<()> {
        match kind {
            PipelineKind::Sales => {
                for row in &file.sales_rows {
                    persist_staging_invoice(&self.pool, row).await?;
                }
                self.create_verification_rows(tenant, &file.sales_rows).await?;
            }
            PipelineKind::Vendor => {
                for line in &file.vendor_lines {
                    persist_staging_vendor_line(&self.pool, line).await?;
                }
            }
        }
        Ok(())
    }

    /// §4.8.2 step 6: one header per receipt_number, findings assembled
    /// from date-gap/missing-date/duplicate checks across the batch.
    async fn create_verification_rows(&self, tenant: &str, rows: &[StagingInvoice]) -> Result<()> {
        let mut by_receipt: HashMap<String, Vec<&StagingInvoice>> = HashMap::new();
        for row in rows {
            if let Some(receipt_number) = &row.receipt_number {
                by_receipt.entry(receipt_number.clone()).or_default().push(row);
            }
        }

        let mut receipt_numbers: Vec<&String> = by_receipt.keys().collect();
        receipt_numbers.sort_by(|a, b| {
            let date_a = by_receipt[*a].first().and_then(|r| r.date);
            let date_b = by_receipt[*b].first().and_then(|r| r.date);
            a.cmp(b).then(date_a.cmp(&date_b))
        });

        let mut blob_key_counts: HashMap<&str, usize> = HashMap::new();
        for row in rows {
            *blob_key_counts.entry(row.blob_key.as_str()).or_insert(0) += 1;
        }

        let mut previous_date = None;
        for receipt_number in receipt_numbers {
            let group = &by_receipt[receipt_number];
            let count_in_batch = group.len();
            let date = group.first().and_then(|r| r.date);
            let blob_key = group.first().map(|r| r.blob_key.clone());

            let mut findings = Vec::new();
            if date.is_none() {
                findings.push("Missing Date".to_string());
            }
            if let Some(finding) = super::verification::date_diff_finding(previous_date, date) {
                findings.push(finding);
            }
            let distinct_blob_keys: std::collections::HashSet<&str> =
                group.iter().map(|r| r.blob_key.as_str()).collect();
            if count_in_batch > 1 && distinct_blob_keys.len() > 1 {
                findings.push("Duplicate Receipt Number".to_string());
            }
            if blob_key.as_deref().map(|k| blob_key_counts.get(k).copied().unwrap_or(0) > 1).unwrap_or(false) {
                findings.push("Duplicate Receipt Link".to_string());
            }
            previous_date = date.or(previous_date);

            let joined = findings.join("|");
            let status = VerificationHeader::status_from_findings(&joined);

            let header_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO verification_headers
                    (id, row_id, tenant, receipt_number, date, blob_key, audit_findings, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(header_id)
            .bind(format!("{receipt_number}_hdr"))
            .bind(tenant)
            .bind(receipt_number)
            .bind(date)
            .bind(&blob_key)
            .bind(&joined)
            .bind(status)
            .execute(&self.pool)
            .await?;

            for row in group {
                let mismatch = match (row.quantity, row.rate, row.amount) {
                    (Some(quantity), Some(rate), Some(amount)) => {
                        (rust_decimal::Decimal::from(quantity) * rate - amount).abs()
                    }
                    _ => rust_decimal::Decimal::ZERO,
                };
                let line_status = if mismatch.is_zero() { VerificationStatus::Done } else { VerificationStatus::Pending };
                sqlx::query(
                    r#"
                    INSERT INTO verification_lines
                        (id, row_id, header_id, tenant, description, quantity, rate, amount, amount_mismatch, blob_key, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&row.row_id)
                .bind(header_id)
                .bind(tenant)
                .bind(&row.description)
                .bind(row.quantity)
                .bind(row.rate)
                .bind(row.amount)
                .bind(mismatch)
                .bind(&row.blob_key)
                .bind(line_status)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}

struct ProcessedFile {
    key: String,
    sales_rows: Vec<StagingInvoice>,
    vendor_lines: Vec<StagingVendorLine>,
}

fn item_field(item: &ExtractedItem, key: &str) -> Option<String> {
    item.fields.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn build_sales_row(
    tenant: &str,
    blob_key: &str,
    image_hash: &str,
    receipt_number: Option<&str>,
    date_raw: Option<&str>,
    idx: usize,
    item: &ExtractedItem,
) -> StagingInvoice {
    let date = date_raw.and_then(normalize::parse_flexible_date);
    let row_id = receipt_number
        .map(|r| normalize::sales_row_id(r, idx))
        .unwrap_or_else(|| normalize::vendor_row_id(None, image_hash, idx));

    StagingInvoice {
        id: Uuid::new_v4(),
        row_id,
        tenant: tenant.to_string(),
        receipt_number: receipt_number.map(String::from),
        date,
        customer: item_field(item, "customer").map(|v| normalize::title_case(&v)),
        vehicle: item_field(item, "vehicle").map(|v| normalize::normalize_vehicle_number(&v)),
        description: item_field(item, "description").map(|v| normalize::title_case(&v)),
        quantity: item_field(item, "quantity")
            .and_then(|v| invoice_shared::models::staging::normalize_numeric_field(
                invoice_shared::models::staging::NumericField::Integer,
                &v,
            ))
            .and_then(as_integer),
        rate: item_field(item, "rate")
            .and_then(|v| invoice_shared::models::staging::normalize_numeric_field(
                invoice_shared::models::staging::NumericField::Float,
                &v,
            ))
            .and_then(as_decimal),
        amount: item_field(item, "amount")
            .and_then(|v| invoice_shared::models::staging::normalize_numeric_field(
                invoice_shared::models::staging::NumericField::Float,
                &v,
            ))
            .and_then(as_decimal),
        odometer: item_field(item, "odometer")
            .and_then(|v| invoice_shared::models::staging::normalize_numeric_field(
                invoice_shared::models::staging::NumericField::Integer,
                &v,
            ))
            .and_then(as_integer),
        blob_key: blob_key.to_string(),
        image_hash: image_hash.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn build_vendor_line(
    tenant: &str,
    blob_key: &str,
    image_hash: &str,
    invoice_number: Option<&str>,
    idx: usize,
    item: &ExtractedItem,
    is_handwritten: bool,
) -> StagingVendorLine {
    use invoice_shared::models::staging::{normalize_numeric_field, NumericField};

    let quantity = item_field(item, "quantity")
        .and_then(|v| normalize_numeric_field(NumericField::Integer, &v))
        .and_then(as_integer);
    let rate = item_field(item, "rate")
        .and_then(|v| normalize_numeric_field(NumericField::Float, &v))
        .and_then(as_decimal);
    let taxable_amount = item_field(item, "taxable_amount")
        .and_then(|v| normalize_numeric_field(NumericField::Float, &v))
        .and_then(as_decimal);
    let discount_percent = item_field(item, "discount_percent")
        .and_then(|v| normalize_numeric_field(NumericField::Float, &v))
        .and_then(as_decimal);
    let cgst_percent = item_field(item, "cgst_percent")
        .and_then(|v| normalize_numeric_field(NumericField::Float, &v))
        .and_then(as_decimal);
    let sgst_percent = item_field(item, "sgst_percent")
        .and_then(|v| normalize_numeric_field(NumericField::Float, &v))
        .and_then(as_decimal);

    let tax = normalize::compute_vendor_tax(
        normalize::VendorLineTaxInputs { quantity, rate, taxable_amount, discount_percent, cgst_percent, sgst_percent },
        is_handwritten,
    );

    StagingVendorLine {
        id: Uuid::new_v4(),
        row_id: normalize::vendor_row_id(invoice_number, image_hash, idx),
        tenant: tenant.to_string(),
        part_number: item_field(item, "part_number"),
        batch: item_field(item, "batch"),
        hsn: item_field(item, "hsn"),
        description: item_field(item, "description").map(|v| normalize::title_case(&v)),
        quantity,
        rate,
        taxable_amount,
        discount_percent,
        cgst_percent,
        sgst_percent,
        discounted_price: tax.discounted_price,
        taxed_amount: tax.taxed_amount,
        net_bill: tax.net_bill,
        amount_mismatch: tax.amount_mismatch,
        excluded_from_stock: false,
        blob_key: blob_key.to_string(),
        image_hash: image_hash.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn as_integer(value: invoice_shared::models::staging::NumericValue) -> Option<i64> {
    match value {
        invoice_shared::models::staging::NumericValue::Integer(i) => Some(i),
        invoice_shared::models::staging::NumericValue::Float(f) => Some(f as i64),
    }
}

fn as_decimal(value: invoice_shared::models::staging::NumericValue) -> Option<rust_decimal::Decimal> {
    use rust_decimal::prelude::FromPrimitive;
    match value {
        invoice_shared::models::staging::NumericValue::Integer(i) => Some(rust_decimal::Decimal::from(i)),
        invoice_shared::models::staging::NumericValue::Float(f) => rust_decimal::Decimal::from_f64(f),
    }
}

async fn persist_staging_invoice(pool: &DbPool, row: &StagingInvoice) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO staging_invoices
            (id, row_id, tenant, receipt_number, date, customer, vehicle, description,
             quantity, rate, amount, odometer, blob_key, image_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (row_id) DO UPDATE SET
            receipt_number = EXCLUDED.receipt_number,
            date = EXCLUDED.date,
            customer = EXCLUDED.customer,
            vehicle = EXCLUDED.vehicle,
            description = EXCLUDED.description,
            quantity = EXCLUDED.quantity,
            rate = EXCLUDED.rate,
            amount = EXCLUDED.amount,
            odometer = EXCLUDED.odometer
        "#,
    )
    .bind(row.id)
    .bind(&row.row_id)
    .bind(&row.tenant)
    .bind(&row.receipt_number)
    .bind(row.date)
    .bind(&row.customer)
    .bind(&row.vehicle)
    .bind(&row.description)
    .bind(row.quantity)
    .bind(row.rate)
    .bind(row.amount)
    .bind(row.odometer)
    .bind(&row.blob_key)
    .bind(&row.image_hash)
    .execute(pool)
    .await?;
    Ok(())
}

async fn persist_staging_vendor_line(pool: &DbPool, line: &StagingVendorLine) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO staging_vendor_lines
            (id, row_id, tenant, part_number, batch, hsn, description, quantity, rate,
             taxable_amount, discount_percent, cgst_percent, sgst_percent, discounted_price,
             taxed_amount, net_bill, amount_mismatch, excluded_from_stock, blob_key, image_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        ON CONFLICT (row_id) DO UPDATE SET
            quantity = EXCLUDED.quantity,
            rate = EXCLUDED.rate,
            taxable_amount = EXCLUDED.taxable_amount,
            discounted_price = EXCLUDED.discounted_price,
            taxed_amount = EXCLUDED.taxed_amount,
            net_bill = EXCLUDED.net_bill,
            amount_mismatch = EXCLUDED.amount_mismatch
        "#,
    )
    .bind(line.id)
    .bind(&line.row_id)
    .bind(&line.tenant)
    .bind(&line.part_number)
    .bind(&line.batch)
    .bind(&line.hsn)
    .bind(&line.description)
    .bind(line.quantity)
    .bind(line.rate)
    .bind(line.taxable_amount)
    .bind(line.discount_percent)
    .bind(line.cgst_percent)
    .bind(line.sgst_percent)
    .bind(line.discounted_price)
    .bind(line.taxed_amount)
    .bind(line.net_bill)
    .bind(line.amount_mismatch)
    .bind(line.excluded_from_stock)
    .bind(&line.blob_key)
    .bind(&line.image_hash)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use sqlx::PgPool;

    fn item_with(fields: serde_json::Value) -> ExtractedItem {
        ExtractedItem {
            fields: fields.as_object().cloned().unwrap_or_default(),
            confidence: Some(90.0),
        }
    }

    struct UnusedObjectStore;

    #[async_trait]
    impl super::super::object_store::ObjectStore for UnusedObjectStore {
        async fn put(&self, _bucket: &str, _key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
            unimplemented!("not exercised by create_verification_rows tests")
        }
        async fn get(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>> {
            unimplemented!("not exercised by create_verification_rows tests")
        }
        async fn delete(&self, _bucket: &str, _key: &str) -> Result<()> {
            unimplemented!("not exercised by create_verification_rows tests")
        }
        async fn list(&self, _bucket: &str, _prefix: &str) -> Result<Vec<String>> {
            unimplemented!("not exercised by create_verification_rows tests")
        }
        fn public_url(&self, _bucket: &str, _key: &str) -> String {
            unimplemented!("not exercised by create_verification_rows tests")
        }
    }

    fn pipeline(pool: PgPool) -> IngestionPipeline {
        IngestionPipeline::new(
            pool,
            Arc::new(UnusedObjectStore),
            Arc::new(VisionExtractor::new(invoice_shared::config::AppConfig::default().vision)),
            IngestionConfig::default(),
        )
    }

    fn staging_row(
        row_id: &str,
        receipt_number: &str,
        blob_key: &str,
        quantity: Option<i64>,
        rate: Option<rust_decimal::Decimal>,
        amount: Option<rust_decimal::Decimal>,
    ) -> StagingInvoice {
        let now = Utc::now();
        StagingInvoice {
            id: Uuid::new_v4(),
            row_id: row_id.to_string(),
            tenant: "acme".to_string(),
            receipt_number: Some(receipt_number.to_string()),
            date: chrono::NaiveDate::from_ymd_opt(2024, 3, 15),
            customer: None,
            vehicle: None,
            description: Some("Oil Change".to_string()),
            quantity,
            rate,
            amount,
            odometer: None,
            blob_key: blob_key.to_string(),
            image_hash: format!("hash-{row_id}"),
            created_at: now,
            updated_at: now,
        }
    }

    /// §4.8.2 step 6: the same receipt_number spanning more than one
    /// distinct image in the batch is a "Duplicate Receipt Number" finding,
    /// which forces the header to `DuplicateReceiptNumber` status.
    #[sqlx::test(migrations = "../migrations")]
    async fn duplicate_receipt_number_across_distinct_images_is_flagged(pool: PgPool) {
        let rows = vec![
            staging_row("R1_0", "R1", "acme/sales/one.jpg", None, None, None),
            staging_row("R1_1", "R1", "acme/sales/two.jpg", None, None, None),
        ];

        pipeline(pool.clone()).create_verification_rows("acme", &rows).await.unwrap();

        let header: (String, VerificationStatus) = sqlx::query_as(
            "SELECT audit_findings, status FROM verification_headers WHERE tenant = $1 AND receipt_number = $2",
        )
        .bind("acme")
        .bind("R1")
        .fetch_one(&pool)
        .await
        .unwrap();

        assert!(header.0.contains("Duplicate Receipt Number"));
        assert_eq!(header.1, VerificationStatus::DuplicateReceiptNumber);
    }

    /// §4.8.2 step 6: `amount_mismatch = |quantity * rate - amount|`; a
    /// matching line is `Done`, a mismatched one is `Pending`.
    #[sqlx::test(migrations = "../migrations")]
    async fn amount_mismatch_is_computed_from_quantity_rate_and_amount(pool: PgPool) {
        let rows = vec![
            staging_row("R2_0", "R2", "acme/sales/match.jpg", Some(2), Some(dec!(150.00)), Some(dec!(300.00))),
            staging_row("R3_0", "R3", "acme/sales/mismatch.jpg", Some(2), Some(dec!(150.00)), Some(dec!(250.00))),
        ];

        pipeline(pool.clone()).create_verification_rows("acme", &rows).await.unwrap();

        let matching: (rust_decimal::Decimal, VerificationStatus) = sqlx::query_as(
            "SELECT amount_mismatch, status FROM verification_lines WHERE tenant = $1 AND row_id = $2",
        )
        .bind("acme")
        .bind("R2_0")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(matching.0, rust_decimal::Decimal::ZERO);
        assert_eq!(matching.1, VerificationStatus::Done);

        let mismatched: (rust_decimal::Decimal, VerificationStatus) = sqlx::query_as(
            "SELECT amount_mismatch, status FROM verification_lines WHERE tenant = $1 AND row_id = $2",
        )
        .bind("acme")
        .bind("R3_0")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(mismatched.0, dec!(50.00));
        assert_eq!(mismatched.1, VerificationStatus::Pending);
    }

    #[test]
    fn sales_row_applies_text_casing_and_date_parsing() {
        let item = item_with(json!({
            "customer": "jane DOE",
            "vehicle": "mh 12 ab 1234",
            "description": "OIL change",
            "quantity": "2.0",
            "rate": "150.50",
            "amount": "301.0",
        }));

        let row = build_sales_row("acme", "blob-1", "hash123456789", Some("R1"), Some("15-03-2024"), 0, &item);

        assert_eq!(row.customer.as_deref(), Some("Jane Doe"));
        assert_eq!(row.vehicle.as_deref(), Some("MH12AB1234"));
        assert_eq!(row.description.as_deref(), Some("Oil Change"));
        assert_eq!(row.quantity, Some(2));
        assert_eq!(row.row_id, "R1_0");
        assert!(row.date.is_some());
    }

    #[test]
    fn vendor_row_id_falls_back_when_invoice_number_missing() {
        let item = item_with(json!({"part_number": "P-1"}));
        let line = build_vendor_line("acme", "blob-1", "deadbeefcafebabe1234", None, 3, &item, true);
        assert!(line.row_id.starts_with("INV_deadbeefcafe_3"));
    }
}

// ============================================================================
// Module: core/src/verification.rs
// Description: `Sync & Finish` reconciliation state machine (C9)
// ============================================================================

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use invoice_shared::error::Result;
use invoice_shared::models::staging::StagingInvoice;
use invoice_shared::models::verification::{VerificationHeader, VerificationLine, VerificationStatus};
use invoice_shared::models::verification::VerifiedInvoice;
use sqlx::PgPool;
use tokio::sync::mpsc::Sender;
use tracing::info;
use uuid::Uuid;

/// Stage tags for the SSE progress stream, spec §4.9.3 step S9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Reading,
    BuildingVerified,
    SavingInvoices,
    SavingVerified,
    Cleanup,
    Complete,
}

impl SyncStage {
    pub fn tag(self) -> &'static str {
        match self {
            SyncStage::Reading => "reading",
            SyncStage::BuildingVerified => "building_verified",
            SyncStage::SavingInvoices => "saving_invoices",
            SyncStage::SavingVerified => "saving_verified",
            SyncStage::Cleanup => "cleanup",
            SyncStage::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncProgressEvent {
    pub stage: SyncStage,
    pub percentage: u8,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SyncFinishResult {
    pub records_synced: usize,
}

/// S2: map `receipt_number -> blob_key`, scanning dates-review (headers),
/// amounts-review (lines), then staging, in that priority, spec §4.9.3.
fn build_receipt_link_map(
    headers: &[VerificationHeader],
    lines: &[VerificationLine],
    staging: &[StagingInvoice],
) -> HashMap<String, String> {
    let mut map = HashMap::new();

    for staging_row in staging {
        if let Some(receipt_number) = &staging_row.receipt_number {
            if !staging_row.blob_key.is_empty() {
                map.entry(receipt_number.clone()).or_insert_with(|| staging_row.blob_key.clone());
            }
        }
    }
    for line in lines {
        if let (Some(blob_key), Some(receipt_number)) = (&line.blob_key, line_receipt_number(line, headers)) {
            map.insert(receipt_number, blob_key.clone());
        }
    }
    for header in headers {
        if let Some(blob_key) = &header.blob_key {
            map.insert(header.receipt_number.clone(), blob_key.clone());
        }
    }

    map
}

fn line_receipt_number(line: &VerificationLine, headers: &[VerificationHeader]) -> Option<String> {
    headers.iter().find(|h| h.id == line.header_id).map(|h| h.receipt_number.clone())
}

/// S2: back-fill missing blob_key links on staging rows from the map built
/// above.
fn repair_receipt_links(staging: &mut [StagingInvoice], link_map: &HashMap<String, String>) {
    for row in staging.iter_mut() {
        if row.blob_key.is_empty() {
            if let Some(receipt_number) = &row.receipt_number {
                if let Some(blob_key) = link_map.get(receipt_number) {
                    row.blob_key = blob_key.clone();
                }
            }
        }
    }
}

/// S3: for every `Done` header, overwrite receipt_number/date on staging
/// rows sharing its blob_key.
fn apply_date_corrections(staging: &mut [StagingInvoice], headers: &[VerificationHeader]) {
    for header in headers {
        if header.status != VerificationStatus::Done {
            continue;
        }
        let Some(blob_key) = &header.blob_key else { continue };

        for row in staging.iter_mut() {
            if &row.blob_key == blob_key {
                row.receipt_number = Some(header.receipt_number.clone());
                row.date = header.date;
            }
        }
    }
}

/// S4: for every `Done` line, overwrite quantity/rate/amount/description on
/// staging rows matching (blob_key, description).
fn apply_amount_corrections(staging: &mut [StagingInvoice], lines: &[VerificationLine]) {
    for line in lines {
        if line.status != VerificationStatus::Done {
            continue;
        }
        let (Some(blob_key), Some(description)) = (&line.blob_key, &line.description) else { continue };

        for row in staging.iter_mut() {
            if &row.blob_key == blob_key && row.description.as_deref() == Some(description.as_str()) {
                row.quantity = line.quantity;
                row.rate = line.rate;
                row.amount = line.amount;
            }
        }
    }
}

/// S5/S7: a receipt_number is fully done when it is not Pending in either
/// review table (or has no review row at all), spec §4.9.3.
fn receipt_is_fully_done(
    receipt_number: &str,
    headers_by_receipt: &HashMap<&str, &VerificationHeader>,
    lines_by_header: &HashMap<Uuid, Vec<&VerificationLine>>,
) -> bool {
    let Some(header) = headers_by_receipt.get(receipt_number) else {
        return true;
    };

    if matches!(header.status, VerificationStatus::Pending | VerificationStatus::DuplicateReceiptNumber) {
        return false;
    }

    lines_by_header
        .get(&header.id)
        .map(|lines| lines.iter().all(|l| l.status != VerificationStatus::Pending))
        .unwrap_or(true)
}

/// S7: rebuild the `VerifiedInvoice` target set. Returns the deduplicated
/// (by `row_id`, keeping the last) set of rows to upsert.
fn rebuild_verified_invoices(
    staging: &[StagingInvoice],
    headers: &[VerificationHeader],
    lines: &[VerificationLine],
) -> Vec<VerifiedInvoice> {
    let headers_by_receipt: HashMap<&str, &VerificationHeader> =
        headers.iter().map(|h| (h.receipt_number.as_str(), h)).collect();
    let mut lines_by_header: HashMap<Uuid, Vec<&VerificationLine>> = HashMap::new();
    for line in lines {
        lines_by_header.entry(line.header_id).or_default().push(line);
    }

    let mut deduped: HashMap<String, VerifiedInvoice> = HashMap::new();

    for row in staging {
        let qualifies = match &row.receipt_number {
            None => true,
            Some(receipt_number) => receipt_is_fully_done(receipt_number, &headers_by_receipt, &lines_by_header),
        };
        if !qualifies {
            continue;
        }

        deduped.insert(row.row_id.clone(), staging_to_verified(row));
    }

    for header in headers {
        if header.status != VerificationStatus::Done {
            continue;
        }
        if staging.iter().any(|s| s.receipt_number.as_deref() == Some(header.receipt_number.as_str())) {
            continue;
        }
        let Some(blob_key) = &header.blob_key else { continue };

        deduped.insert(
            header.row_id.clone(),
            VerifiedInvoice {
                row_id: header.row_id.clone(),
                tenant: header.tenant.clone(),
                receipt_number: Some(header.receipt_number.clone()),
                date: header.date,
                customer: None,
                vehicle: None,
                description: None,
                quantity: None,
                rate: None,
                amount: None,
                blob_key: Some(blob_key.clone()),
                image_hash: String::new(),
                created_at: Utc::now(),
            },
        );
    }

    for line in lines {
        if line.status != VerificationStatus::Done {
            continue;
        }
        if staging.iter().any(|s| s.row_id == line.row_id) {
            continue;
        }
        let Some(blob_key) = &line.blob_key else { continue };

        deduped.insert(
            line.row_id.clone(),
            VerifiedInvoice {
                row_id: line.row_id.clone(),
                tenant: line.tenant.clone(),
                receipt_number: None,
                date: None,
                customer: None,
                vehicle: None,
                description: line.description.clone(),
                quantity: line.quantity,
                rate: line.rate,
                amount: line.amount,
                blob_key: Some(blob_key.clone()),
                image_hash: String::new(),
                created_at: Utc::now(),
            },
        );
    }

    deduped.into_values().collect()
}

fn staging_to_verified(row: &StagingInvoice) -> VerifiedInvoice {
    VerifiedInvoice {
        row_id: row.row_id.clone(),
        tenant: row.tenant.clone(),
        receipt_number: row.receipt_number.clone(),
        date: row.date,
        customer: row.customer.clone(),
        vehicle: row.vehicle.clone(),
        description: row.description.clone(),
        quantity: row.quantity,
        rate: row.rate,
        amount: row.amount,
        blob_key: Some(row.blob_key.clone()),
        image_hash: row.image_hash.clone(),
        created_at: Utc::now(),
    }
}

/// S8: prune rule. A `Done` header may only be dropped if no line under the
/// same receipt_number is Pending, and vice versa for lines; Pending and
/// DuplicateReceiptNumber rows are always retained; Rejected rows are
/// always dropped.
fn headers_to_retain(headers: &[VerificationHeader], lines: &[VerificationLine]) -> HashSet<Uuid> {
    let mut lines_by_header: HashMap<Uuid, Vec<&VerificationLine>> = HashMap::new();
    for line in lines {
        lines_by_header.entry(line.header_id).or_default().push(line);
    }

    headers
        .iter()
        .filter(|h| {
            if h.audit_findings.contains("Rejected") {
                return false;
            }
            if matches!(h.status, VerificationStatus::Pending | VerificationStatus::DuplicateReceiptNumber) {
                return true;
            }
            let has_pending_line = lines_by_header
                .get(&h.id)
                .map(|ls| ls.iter().any(|l| l.status == VerificationStatus::Pending))
                .unwrap_or(false);
            !has_pending_line
        })
        .map(|h| h.id)
        .collect()
}

fn lines_to_retain(lines: &[VerificationLine], headers: &[VerificationHeader]) -> HashSet<Uuid> {
    let headers_by_id: HashMap<Uuid, &VerificationHeader> = headers.iter().map(|h| (h.id, h)).collect();

    lines
        .iter()
        .filter(|l| {
            if matches!(l.status, VerificationStatus::Pending | VerificationStatus::DuplicateReceiptNumber) {
                return true;
            }
            let header_pending = headers_by_id
                .get(&l.header_id)
                .map(|h| h.status == VerificationStatus::Pending)
                .unwrap_or(false);
            !header_pending
        })
        .map(|l| l.id)
        .collect()
}

/// S3 boundary case: a `Date Diff: N` finding, spec §4.8.2 step 6.
pub fn date_diff_finding(previous: Option<NaiveDate>, current: Option<NaiveDate>) -> Option<String> {
    let (prev, curr) = (previous?, current?);
    let gap = (curr - prev).num_days().abs();
    if gap > 1 {
        Some(format!("Date Diff: {gap}"))
    } else {
        None
    }
}

/// Orchestrates S1-S8 against the database, emitting progress at
/// 5/40/60/80/95/100%, spec §4.9.3 step S9.
pub struct SyncFinishEngine {
    pool: PgPool,
}

impl SyncFinishEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run(&self, tenant: &str, progress: Option<Sender<SyncProgressEvent>>) -> Result<SyncFinishResult> {
        let emit = |stage: SyncStage, percentage: u8, message: &str| {
            let progress = progress.clone();
            let message = message.to_string();
            async move {
                if let Some(tx) = progress {
                    let _ = tx.send(SyncProgressEvent { stage, percentage, message }).await;
                }
            }
        };

        emit(SyncStage::Reading, 5, "loading staging and review tables").await;

        let mut staging: Vec<StagingInvoice> =
            sqlx::query_as("SELECT * FROM staging_invoices WHERE tenant = $1")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;
        let headers: Vec<VerificationHeader> =
            sqlx::query_as("SELECT * FROM verification_headers WHERE tenant = $1")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;
        let lines: Vec<VerificationLine> =
            sqlx::query_as("SELECT * FROM verification_lines WHERE tenant = $1")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;

        let link_map = build_receipt_link_map(&headers, &lines, &staging);
        repair_receipt_links(&mut staging, &link_map);
        apply_date_corrections(&mut staging, &headers);
        apply_amount_corrections(&mut staging, &lines);

        emit(SyncStage::BuildingVerified, 40, "rebuilding verified invoices").await;
        let verified = rebuild_verified_invoices(&staging, &headers, &lines);

        emit(SyncStage::SavingInvoices, 60, "persisting corrected staging rows").await;
        for row in &staging {
            persist_staging_row(&self.pool, row).await?;
        }

        emit(SyncStage::SavingVerified, 80, "upserting verified invoices").await;
        for row in &verified {
            persist_verified_row(&self.pool, row).await?;
        }

        emit(SyncStage::Cleanup, 95, "pruning review tables").await;
        let keep_headers = headers_to_retain(&headers, &lines);
        let keep_lines = lines_to_retain(&lines, &headers);
        for header in &headers {
            if !keep_headers.contains(&header.id) {
                sqlx::query("DELETE FROM verification_headers WHERE id = $1")
                    .bind(header.id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        for line in &lines {
            if !keep_lines.contains(&line.id) {
                sqlx::query("DELETE FROM verification_lines WHERE id = $1")
                    .bind(line.id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        let result = SyncFinishResult { records_synced: verified.len() };
        emit(SyncStage::Complete, 100, "sync & finish complete").await;
        info!(tenant, records = result.records_synced, "sync & finish complete");

        Ok(result)
    }
}

async fn persist_staging_row(pool: &PgPool, row: &StagingInvoice) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO staging_invoices
            (row_id, tenant, receipt_number, date, customer, vehicle, description,
             quantity, rate, amount, odometer, blob_key, image_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (row_id) DO UPDATE SET
            receipt_number = EXCLUDED.receipt_number,
            date = EXCLUDED.date,
            customer = EXCLUDED.customer,
            vehicle = EXCLUDED.vehicle,
            description = EXCLUDED.description,
            quantity = EXCLUDED.quantity,
            rate = EXCLUDED.rate,
            amount = EXCLUDED.amount,
            odometer = EXCLUDED.odometer,
            blob_key = EXCLUDED.blob_key
        "#,
    )
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

async fn persist_verified_row(pool: &PgPool, row: &VerifiedInvoice) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO verified_invoices
            (row_id, tenant, receipt_number, date, customer, vehicle, description,
             quantity, rate, amount, blob_key, image_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (row_id) DO UPDATE SET
            receipt_number = EXCLUDED.receipt_number,
            date = EXCLUDED.date,
            customer = EXCLUDED.customer,
            vehicle = EXCLUDED.vehicle,
            description = EXCLUDED.description,
            quantity = EXCLUDED.quantity,
            rate = EXCLUDED.rate,
            amount = EXCLUDED.amount,
            blob_key = EXCLUDED.blob_key
        "#,
    )
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
    .bind(&row.blob_key)
    .bind(&row.image_hash)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn staging_row(row_id: &str, receipt_number: Option<&str>, blob_key: &str) -> StagingInvoice {
        StagingInvoice {
            id: Uuid::new_v4(),
            row_id: row_id.to_string(),
            tenant: "acme".to_string(),
            receipt_number: receipt_number.map(String::from),
            date: NaiveDate::from_ymd_opt(2024, 1, 10),
            customer: None,
            vehicle: None,
            description: Some("desc".to_string()),
            quantity: Some(1),
            rate: Some(dec!(10)),
            amount: Some(dec!(10)),
            odometer: None,
            blob_key: blob_key.to_string(),
            image_hash: "hash".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn header(receipt_number: &str, status: VerificationStatus, blob_key: Option<&str>) -> VerificationHeader {
        VerificationHeader {
            id: Uuid::new_v4(),
            row_id: format!("{receipt_number}_hdr"),
            tenant: "acme".to_string(),
            receipt_number: receipt_number.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10),
            blob_key: blob_key.map(String::from),
            audit_findings: String::new(),
            status,
            bbox: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn date_diff_over_one_day_is_flagged() {
        let prev = NaiveDate::from_ymd_opt(2024, 1, 1);
        let curr = NaiveDate::from_ymd_opt(2024, 1, 5);
        assert_eq!(date_diff_finding(prev, curr), Some("Date Diff: 4".to_string()));
    }

    #[test]
    fn date_diff_of_one_is_normal_sequence() {
        let prev = NaiveDate::from_ymd_opt(2024, 1, 1);
        let curr = NaiveDate::from_ymd_opt(2024, 1, 2);
        assert_eq!(date_diff_finding(prev, curr), None);
    }

    #[test]
    fn receipt_with_no_review_row_is_fully_done() {
        let headers_by_receipt = HashMap::new();
        let lines_by_header = HashMap::new();
        assert!(receipt_is_fully_done("R1", &headers_by_receipt, &lines_by_header));
    }

    #[test]
    fn pending_header_blocks_promotion() {
        let h = header("R1", VerificationStatus::Pending, Some("blob"));
        let headers_by_receipt: HashMap<&str, &VerificationHeader> =
            [("R1", &h)].into_iter().collect();
        let lines_by_header = HashMap::new();
        assert!(!receipt_is_fully_done("R1", &headers_by_receipt, &lines_by_header));
    }

    #[test]
    fn rebuild_includes_rows_without_review() {
        let staging = vec![staging_row("row-1", None, "blob-1")];
        let verified = rebuild_verified_invoices(&staging, &[], &[]);
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].row_id, "row-1");
    }

    #[test]
    fn rebuild_excludes_pending_receipts() {
        let staging = vec![staging_row("row-1", Some("R1"), "blob-1")];
        let h = header("R1", VerificationStatus::Pending, Some("blob-1"));
        let verified = rebuild_verified_invoices(&staging, &[h], &[]);
        assert!(verified.is_empty());
    }

    #[test]
    fn rebuild_synthesizes_orphan_from_done_header() {
        let h = header("R1", VerificationStatus::Done, Some("blob-orphan"));
        let verified = rebuild_verified_invoices(&[], &[h], &[]);
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].blob_key.as_deref(), Some("blob-orphan"));
    }

    #[test]
    fn orphan_without_blob_key_is_skipped() {
        let h = header("R1", VerificationStatus::Done, None);
        let verified = rebuild_verified_invoices(&[], &[h], &[]);
        assert!(verified.is_empty());
    }

    #[test]
    fn prune_retains_pending_and_duplicate_headers() {
        let pending = header("R1", VerificationStatus::Pending, None);
        let duplicate = header("R2", VerificationStatus::DuplicateReceiptNumber, None);
        let headers = vec![pending.clone(), duplicate.clone()];
        let retain = headers_to_retain(&headers, &[]);
        assert!(retain.contains(&pending.id));
        assert!(retain.contains(&duplicate.id));
    }

    #[test]
    fn prune_drops_rejected_headers() {
        let mut rejected = header("R1", VerificationStatus::Done, None);
        rejected.audit_findings = "Rejected".to_string();
        let retain = headers_to_retain(&[rejected.clone()], &[]);
        assert!(!retain.contains(&rejected.id));
    }

    #[test]
    fn date_correction_overwrites_matching_blob_key() {
        let mut staging = vec![staging_row("row-1", Some("OLD"), "blob-1")];
        let h = header("NEW", VerificationStatus::Done, Some("blob-1"));
        apply_date_corrections(&mut staging, &[h]);
        assert_eq!(staging[0].receipt_number.as_deref(), Some("NEW"));
    }
}

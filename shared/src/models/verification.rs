// ============================================================================
// Module: shared/src/models/verification.rs
// Description: Verification review and terminal entities (C9, spec §3/§4.9)
// ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::TenantScoped;

/// Review/terminal status, spec §3. `AlreadyVerified` and
/// `DuplicateReceiptNumber` are header-only outcomes surfaced during
/// `Sync & Finish` (§4.9.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "verification_status", rename_all = "PascalCase")]
pub enum VerificationStatus {
    Pending,
    Done,
    DuplicateReceiptNumber,
    AlreadyVerified,
}

/// Per-receipt review row, spec §3. `audit_findings` is the `"|"`-joined
/// string described in the glossary; `bbox` carries the UI bounding box
/// synthesized per §4.6.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationHeader {
    pub id: Uuid,
    pub row_id: String,
    pub tenant: String,
    pub receipt_number: String,
    pub date: Option<NaiveDate>,
    pub blob_key: Option<String>,
    pub audit_findings: String,
    pub status: VerificationStatus,
    pub bbox: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationHeader {
    /// Status derived from the audit findings, spec §4.8.2 step 6: "`Done`
    /// when findings are empty; `Duplicate Receipt Number` when that
    /// finding is present; else `Pending`."
    pub fn status_from_findings(findings: &str) -> VerificationStatus {
        if findings.is_empty() {
            VerificationStatus::Done
        } else if findings.contains("Duplicate Receipt Number") {
            VerificationStatus::DuplicateReceiptNumber
        } else {
            VerificationStatus::Pending
        }
    }
}

impl TenantScoped for VerificationHeader {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// Per-line-item review row, spec §3. Linked to its header via `header_id`
/// (stable across receipt-number edits), not `receipt_number`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationLine {
    pub id: Uuid,
    pub row_id: String,
    pub header_id: Uuid,
    pub tenant: String,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub rate: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub amount_mismatch: Decimal,
    pub blob_key: Option<String>,
    pub status: VerificationStatus,
    pub bbox: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantScoped for VerificationLine {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// Terminal, immutable-by-default record surfaced to reports, spec §3.
/// `image_hash` supports cross-batch dedup (invariant 1).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerifiedInvoice {
    pub row_id: String,
    pub tenant: String,
    pub receipt_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub customer: Option<String>,
    pub vehicle: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub rate: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub blob_key: Option<String>,
    pub image_hash: String,
    pub created_at: DateTime<Utc>,
}

impl TenantScoped for VerifiedInvoice {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_findings_means_done() {
        assert_eq!(VerificationHeader::status_from_findings(""), VerificationStatus::Done);
    }

    #[test]
    fn duplicate_receipt_number_finding_wins() {
        let findings = "Duplicate Receipt Number|Missing Date";
        assert_eq!(
            VerificationHeader::status_from_findings(findings),
            VerificationStatus::DuplicateReceiptNumber
        );
    }

    #[test]
    fn other_findings_are_pending() {
        assert_eq!(
            VerificationHeader::status_from_findings("Missing Date"),
            VerificationStatus::Pending
        );
    }
}

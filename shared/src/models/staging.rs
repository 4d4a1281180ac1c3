// ============================================================================
// Module: shared/src/models/staging.rs
// Description: Staging-table entities written by the Ingestion Pipeline (C8)
// ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::TenantScoped;

/// Which normalization rule applies to a numeric staging field, spec §3
/// cross-entity invariant 5: "integer fields (quantity, odometer) stored as
/// integers; float fields stored as floats; trailing `.0` stripped from
/// numeric strings." Grounded on `database_helpers.py`'s
/// `convert_numeric_types`, which keeps two explicit field-name lists
/// (`integer_fields`, `float_fields`) rather than inferring from the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Integer(i64),
    Float(f64),
}

/// Parse a numeric staging value extracted as a string by the vision model,
/// applying the field's normalization rule. Returns `None` for blank or
/// unparseable input (the original dropped these rather than raising).
pub fn normalize_numeric_field(field: NumericField, raw: &str) -> Option<NumericValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match field {
        NumericField::Integer => {
            let stripped = trimmed.strip_suffix(".0").unwrap_or(trimmed);
            if let Ok(i) = stripped.parse::<i64>() {
                return Some(NumericValue::Integer(i));
            }
            trimmed.parse::<f64>().ok().map(|f| NumericValue::Integer(f as i64))
        }
        NumericField::Float => trimmed.parse::<f64>().ok().map(NumericValue::Float),
    }
}

/// A flattened sales-receipt line item, spec §3. One uploaded image
/// produces N rows, one per line item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StagingInvoice {
    pub id: uuid::Uuid,
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
    pub odometer: Option<i64>,
    pub blob_key: String,
    pub image_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantScoped for StagingInvoice {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// A flattened vendor-bill line item, spec §3.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StagingVendorLine {
    pub id: uuid::Uuid,
    pub row_id: String,
    pub tenant: String,
    pub part_number: Option<String>,
    pub batch: Option<String>,
    pub hsn: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub rate: Option<Decimal>,
    pub taxable_amount: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    pub cgst_percent: Option<Decimal>,
    pub sgst_percent: Option<Decimal>,
    pub discounted_price: Option<Decimal>,
    pub taxed_amount: Option<Decimal>,
    pub net_bill: Option<Decimal>,
    pub amount_mismatch: Option<Decimal>,
    pub excluded_from_stock: bool,
    pub blob_key: String,
    pub image_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantScoped for StagingVendorLine {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_field_strips_trailing_zero_decimal() {
        assert_eq!(
            normalize_numeric_field(NumericField::Integer, "10.0"),
            Some(NumericValue::Integer(10))
        );
    }

    #[test]
    fn integer_field_accepts_plain_integer() {
        assert_eq!(
            normalize_numeric_field(NumericField::Integer, "42"),
            Some(NumericValue::Integer(42))
        );
    }

    #[test]
    fn float_field_keeps_fraction() {
        assert_eq!(
            normalize_numeric_field(NumericField::Float, "199.50"),
            Some(NumericValue::Float(199.50))
        );
    }

    #[test]
    fn blank_input_normalizes_to_none() {
        assert_eq!(normalize_numeric_field(NumericField::Integer, "  "), None);
        assert_eq!(normalize_numeric_field(NumericField::Float, ""), None);
    }

    #[test]
    fn garbage_input_normalizes_to_none() {
        assert_eq!(normalize_numeric_field(NumericField::Integer, "N/A"), None);
    }
}

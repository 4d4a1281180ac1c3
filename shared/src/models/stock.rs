// ============================================================================
// Module: shared/src/models/stock.rs
// Description: Stock ledger entities and handwritten-token parsers (C10)
// ============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use super::TenantScoped;

/// Reorder priority as marked on a handwritten mapping sheet, spec §3/§4.10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "stock_priority", rename_all = "UPPERCASE")]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    /// Tolerant parser for handwritten priority tokens, spec §4.10:
    /// "accepts `P0..P3`, `0..3`, with or without `P`; out-of-range returns
    /// null." Boundary case from spec §8: `"Po"` (OCR mistaking `0` for
    /// `o`) parses as `P0`.
    pub fn parse_token(raw: &str) -> Option<Priority> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let digits: String = trimmed
            .chars()
            .map(|c| match c {
                'o' | 'O' | '○' | '◯' => '0',
                other => other,
            })
            .filter(|c| c.is_ascii_digit())
            .collect();

        match digits.as_str() {
            "0" => Some(Priority::P0),
            "1" => Some(Priority::P1),
            "2" => Some(Priority::P2),
            "3" => Some(Priority::P3),
            _ => None,
        }
    }
}

/// Tolerant parser for handwritten stock/reorder-point counts, spec §4.10:
/// "numeric → integer; `0` → 0; `O`, `o`, `○`, `◯`, `null` → null
/// (conventional handwritten marker for 'not counted'); non-numeric other
/// → null."
pub fn parse_stock_token(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_lowercase();
    if matches!(lower.as_str(), "o" | "○" | "◯" | "null") {
        return None;
    }

    let stripped = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    stripped
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
}

/// Per-part stock ledger row, spec §3. Invariant: `on_hand = current_stock +
/// manual_adjustment`; `current_stock` itself is `Σ vendor_qty − Σ
/// sales_qty` over non-excluded rows (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockLevel {
    pub tenant: String,
    pub part_number: String,
    pub internal_item_name: Option<String>,
    pub priority: Option<Priority>,
    pub reorder_point: Option<i64>,
    pub current_stock: i64,
    pub manual_adjustment: i64,
    pub old_stock: Option<i64>,
    pub unit_value: Option<Decimal>,
    pub total_value: Decimal,
    #[sqlx(json)]
    pub customer_items: sqlx::types::Json<Vec<String>>,
}

impl StockLevel {
    /// `on_hand = current_stock + manual_adjustment`, spec §3/§8 invariant 4.
    pub fn on_hand(&self) -> i64 {
        self.current_stock + self.manual_adjustment
    }
}

impl TenantScoped for StockLevel {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// Maps vendor descriptions and customer-item aliases to a canonical part,
/// spec §3, consulted by the Stock Engine (§4.10 step 2) when matching
/// sales outflow rows that reference a part by alias rather than part
/// number.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VendorMappingEntry {
    pub tenant: String,
    pub part_number: String,
    #[sqlx(json)]
    pub vendor_descriptions: sqlx::types::Json<Vec<String>>,
    #[sqlx(json)]
    pub customer_item_aliases: sqlx::types::Json<Vec<String>>,
}

impl TenantScoped for VendorMappingEntry {
    fn tenant(&self) -> &str {
        &self.tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_bare_digit() {
        assert_eq!(Priority::parse_token("2"), Some(Priority::P2));
    }

    #[test]
    fn priority_parses_prefixed_digit() {
        assert_eq!(Priority::parse_token("P1"), Some(Priority::P1));
    }

    #[test]
    fn priority_parses_ocr_confused_zero() {
        assert_eq!(Priority::parse_token("Po"), Some(Priority::P0));
    }

    #[test]
    fn priority_out_of_range_is_none() {
        assert_eq!(Priority::parse_token("4"), None);
    }

    #[test]
    fn priority_empty_is_none() {
        assert_eq!(Priority::parse_token(""), None);
    }

    #[test]
    fn stock_token_not_counted_marker_is_none() {
        assert_eq!(parse_stock_token("O"), None);
        assert_eq!(parse_stock_token("○"), None);
        assert_eq!(parse_stock_token("null"), None);
    }

    #[test]
    fn stock_token_zero_is_zero() {
        assert_eq!(parse_stock_token("0"), Some(0));
    }

    #[test]
    fn stock_token_integer_strings() {
        assert_eq!(parse_stock_token("10"), Some(10));
        assert_eq!(parse_stock_token("10.0"), Some(10));
    }

    #[test]
    fn on_hand_sums_current_and_adjustment() {
        let level = StockLevel {
            tenant: "acme".into(),
            part_number: "P-100".into(),
            internal_item_name: None,
            priority: None,
            reorder_point: None,
            current_stock: 10,
            manual_adjustment: -3,
            old_stock: None,
            unit_value: None,
            total_value: Decimal::ZERO,
            customer_items: sqlx::types::Json(vec![]),
        };
        assert_eq!(level.on_hand(), 7);
    }
}

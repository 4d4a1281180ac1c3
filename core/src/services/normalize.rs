// ============================================================================
// Module: core/src/services/normalize.rs
// Description: Text/date/tax normalization rules used by the Ingestion
//              Pipeline (C8), spec §4.8.2 step 3
// ============================================================================

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Title-cases a free-text field: first letter of each whitespace-delimited
/// word upper-cased, the rest lower-cased.
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Vehicle numbers are upper-cased and de-spaced, spec §4.8.2 step 3.
pub fn normalize_vehicle_number(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase()
}

/// Date formats accepted by the multi-format parser, spec §4.8.2 step 3:
/// `%d-%b-%Y`, `%d-%m-%Y`, `%d/%m/%Y`, `%Y-%m-%d`.
const DATE_FORMATS: &[&str] = &["%d-%b-%Y", "%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d"];

/// Parses a free-form date string against each accepted format in order,
/// returning `None` (NULL) if nothing matches.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VendorLineTaxInputs {
    pub quantity: Option<i64>,
    pub rate: Option<Decimal>,
    pub taxable_amount: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    pub cgst_percent: Option<Decimal>,
    pub sgst_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VendorLineTaxOutputs {
    pub discounted_price: Option<Decimal>,
    pub taxed_amount: Option<Decimal>,
    pub net_bill: Option<Decimal>,
    pub amount_mismatch: Option<Decimal>,
}

/// Vendor-line tax math, spec §4.8.2 step 3:
/// `discounted_price = taxable * (100 - disc%) / 100`
/// `taxed_amount = (cgst% + sgst%) * discounted_price / 100`
/// `net_bill = discounted + taxed`
/// `amount_mismatch = |qty*rate - taxable|`, printed invoices only.
pub fn compute_vendor_tax(inputs: VendorLineTaxInputs, is_handwritten: bool) -> VendorLineTaxOutputs {
    let discounted_price = match (inputs.taxable_amount, inputs.discount_percent) {
        (Some(taxable), Some(discount)) => {
            Some(taxable * (Decimal::from(100) - discount) / Decimal::from(100))
        }
        (Some(taxable), None) => Some(taxable),
        _ => None,
    };

    let taxed_amount = match (discounted_price, inputs.cgst_percent, inputs.sgst_percent) {
        (Some(discounted), cgst, sgst) => {
            let rate_sum = cgst.unwrap_or(Decimal::ZERO) + sgst.unwrap_or(Decimal::ZERO);
            Some(rate_sum * discounted / Decimal::from(100))
        }
        _ => None,
    };

    let net_bill = match (discounted_price, taxed_amount) {
        (Some(d), Some(t)) => Some(d + t),
        (Some(d), None) => Some(d),
        _ => None,
    };

    let amount_mismatch = if is_handwritten {
        None
    } else {
        match (inputs.quantity, inputs.rate, inputs.taxable_amount) {
            (Some(qty), Some(rate), Some(taxable)) => {
                let computed = Decimal::from(qty) * rate;
                Some((computed - taxable).abs())
            }
            _ => None,
        }
    };

    VendorLineTaxOutputs {
        discounted_price,
        taxed_amount,
        net_bill,
        amount_mismatch,
    }
}

/// Sales row_id, spec §4.8.2 step 4: `{receipt_number}_{idx}`.
pub fn sales_row_id(receipt_number: &str, idx: usize) -> String {
    format!("{receipt_number}_{idx}")
}

/// Vendor row_id, spec §4.8.2 step 4: `{invoice_number}_{idx}` or
/// `INV_{hash[:12]}_{idx}` when the invoice number is absent.
pub fn vendor_row_id(invoice_number: Option<&str>, image_hash: &str, idx: usize) -> String {
    match invoice_number {
        Some(number) if !number.trim().is_empty() => format!("{number}_{idx}"),
        _ => format!("INV_{}_{idx}", &image_hash[..image_hash.len().min(12)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn title_case_normalizes_mixed_input() {
        assert_eq!(title_case("jOHN dOE"), "John Doe");
    }

    #[test]
    fn vehicle_number_is_upper_and_despaced() {
        assert_eq!(normalize_vehicle_number("mh 12 ab 1234"), "MH12AB1234");
    }

    #[test]
    fn parses_each_accepted_date_format() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_flexible_date("15-Mar-2024"), Some(expected));
        assert_eq!(parse_flexible_date("15-03-2024"), Some(expected));
        assert_eq!(parse_flexible_date("15/03/2024"), Some(expected));
        assert_eq!(parse_flexible_date("2024-03-15"), Some(expected));
    }

    #[test]
    fn unparseable_date_is_none() {
        assert_eq!(parse_flexible_date("not a date"), None);
        assert_eq!(parse_flexible_date(""), None);
    }

    #[test]
    fn printed_invoice_flags_mismatch() {
        let inputs = VendorLineTaxInputs {
            quantity: Some(10),
            rate: Some(dec!(5)),
            taxable_amount: Some(dec!(45)),
            discount_percent: Some(dec!(0)),
            cgst_percent: Some(dec!(9)),
            sgst_percent: Some(dec!(9)),
        };
        let out = compute_vendor_tax(inputs, false);
        assert_eq!(out.amount_mismatch, Some(dec!(5)));
    }

    #[test]
    fn handwritten_invoice_skips_mismatch() {
        let inputs = VendorLineTaxInputs {
            quantity: Some(10),
            rate: Some(dec!(5)),
            taxable_amount: Some(dec!(45)),
            discount_percent: Some(dec!(0)),
            cgst_percent: Some(dec!(9)),
            sgst_percent: Some(dec!(9)),
        };
        let out = compute_vendor_tax(inputs, true);
        assert_eq!(out.amount_mismatch, None);
    }

    #[test]
    fn discounted_price_and_net_bill_computed_correctly() {
        let inputs = VendorLineTaxInputs {
            quantity: None,
            rate: None,
            taxable_amount: Some(dec!(100)),
            discount_percent: Some(dec!(10)),
            cgst_percent: Some(dec!(9)),
            sgst_percent: Some(dec!(9)),
        };
        let out = compute_vendor_tax(inputs, true);
        assert_eq!(out.discounted_price, Some(dec!(90)));
        assert_eq!(out.taxed_amount, Some(dec!(16.2)));
        assert_eq!(out.net_bill, Some(dec!(106.2)));
    }

    #[test]
    fn sales_row_id_format() {
        assert_eq!(sales_row_id("R100", 0), "R100_0");
    }

    #[test]
    fn vendor_row_id_uses_invoice_number_when_present() {
        assert_eq!(vendor_row_id(Some("INV55"), "deadbeefcafebabe", 2), "INV55_2");
    }

    #[test]
    fn vendor_row_id_falls_back_to_hash_prefix() {
        assert_eq!(vendor_row_id(None, "deadbeefcafebabe1234", 1), "INV_deadbeefcafe_1");
    }
}

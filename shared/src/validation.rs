//! Input validation for ledger requests
//!
//! These checks run at the service boundary before any row is locked.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::RuleViolation;

// ============================================================================
// Quantity and Money Validations
// ============================================================================

/// Parse a quantity supplied as text (form fields arrive as strings)
///
/// Accepts plain and scientific decimal notation; rejects negatives.
pub fn parse_quantity(raw: &str) -> Result<Decimal, RuleViolation> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RuleViolation::input("quantity", "is required"));
    }

    let quantity = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| {
            RuleViolation::input("quantity", format!("'{}' is not a number", trimmed))
        })?;

    validate_non_negative("quantity", quantity)?;
    Ok(quantity)
}

/// Validate that an amount is zero or more
pub fn validate_non_negative(field: &str, amount: Decimal) -> Result<(), RuleViolation> {
    if amount < Decimal::ZERO {
        return Err(RuleViolation::input(field, "must not be negative"));
    }
    Ok(())
}

/// Validate that an amount is strictly positive
pub fn validate_positive(field: &str, amount: Decimal) -> Result<(), RuleViolation> {
    if amount <= Decimal::ZERO {
        return Err(RuleViolation::input(field, "must be greater than zero"));
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Trim free text and drop it when blank
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Require non-blank text, e.g. a rejection reason
pub fn require_text(field: &str, value: &str) -> Result<String, RuleViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RuleViolation::input(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_quantity_valid() {
        assert_eq!(parse_quantity("50").unwrap(), dec("50"));
        assert_eq!(parse_quantity(" 12.5 ").unwrap(), dec("12.5"));
        assert_eq!(parse_quantity("0").unwrap(), Decimal::ZERO);
        assert_eq!(parse_quantity("1e2").unwrap(), dec("100"));
    }

    #[test]
    fn test_parse_quantity_invalid() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("   ").is_err());
        assert!(parse_quantity("ten").is_err());
        assert!(parse_quantity("-3").is_err());
    }

    #[test]
    fn test_parse_quantity_names_field() {
        let err = parse_quantity("abc").unwrap_err();
        assert!(matches!(err, RuleViolation::Input { ref field, .. } if field == "quantity"));
    }

    #[test]
    fn test_amount_checks() {
        assert!(validate_non_negative("amount", Decimal::ZERO).is_ok());
        assert!(validate_non_negative("amount", dec("-0.01")).is_err());
        assert!(validate_positive("amount", dec("0.01")).is_ok());
        assert!(validate_positive("amount", Decimal::ZERO).is_err());
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(normalize_text(Some("  hi ".into())), Some("hi".to_string()));
        assert_eq!(normalize_text(Some("   ".into())), None);
        assert_eq!(normalize_text(None), None);
        assert_eq!(require_text("reason", " damaged ").unwrap(), "damaged");
        assert!(require_text("reason", "  ").is_err());
    }
}

//! Decimal parsing for wire payloads
//!
//! Exchanges send prices and volumes either as JSON strings (`"101.25"`) or
//! as JSON numbers, occasionally in scientific notation (`1e-8`). Everything
//! is parsed into `rust_decimal::Decimal` so no floating-point error enters
//! the books.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::ParseError;

/// Parse a decimal from its textual form, accepting scientific notation
pub fn parse_decimal(raw: &str) -> Result<Decimal, ParseError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ParseError::InvalidDecimal(raw.to_string()))
}

/// Parse a decimal from a JSON string or number
pub fn parse_decimal_value(value: &Value) -> Result<Decimal, ParseError> {
    match value {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        other => Err(ParseError::InvalidDecimal(other.to_string())),
    }
}

/// Parse a volume, rejecting negative amounts
pub fn parse_volume(raw: &str) -> Result<Decimal, ParseError> {
    let volume = parse_decimal(raw)?;
    if volume.is_sign_negative() && !volume.is_zero() {
        return Err(ParseError::NegativeVolume(raw.to_string()));
    }
    Ok(volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_decimal_plain() {
        assert_eq!(parse_decimal("101.25").unwrap(), Decimal::new(10125, 2));
        assert_eq!(parse_decimal(" 7 ").unwrap(), Decimal::from(7));
    }

    #[test]
    fn test_parse_decimal_scientific() {
        assert_eq!(parse_decimal("1e-8").unwrap(), Decimal::new(1, 8));
    }

    #[test]
    fn test_parse_decimal_invalid() {
        assert!(parse_decimal("abc").is_err());
    }

    #[test]
    fn test_parse_decimal_value() {
        assert_eq!(parse_decimal_value(&json!("0.5")).unwrap(), Decimal::new(5, 1));
        assert_eq!(parse_decimal_value(&json!(0.5)).unwrap(), Decimal::new(5, 1));
        assert_eq!(parse_decimal_value(&json!(-3)).unwrap(), Decimal::from(-3));
        assert!(parse_decimal_value(&json!(null)).is_err());
    }

    #[test]
    fn test_parse_volume_rejects_negative() {
        assert!(parse_volume("-1").is_err());
        assert_eq!(parse_volume("0").unwrap(), Decimal::ZERO);
    }
}

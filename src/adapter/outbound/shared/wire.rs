//! Parsing helpers for wire payloads.
//!
//! Venues transmit numbers as strings (or occasionally as JSON numbers).
//! Every conversion goes through these helpers so a malformed field becomes
//! a [`VenueError::Decode`] naming the field instead of a silent zero.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::VenueError;

/// Parse a decimal string field.
pub fn decimal(field: &str, raw: &str) -> Result<Decimal, VenueError> {
    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(|_| VenueError::Decode(format!("{field}: invalid number {raw:?}")))
}

/// Parse an optional decimal string field; empty strings count as absent.
pub fn opt_decimal(field: &str, raw: Option<&str>) -> Result<Option<Decimal>, VenueError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => decimal(field, raw).map(Some),
    }
}

/// Parse a decimal from a JSON value that may be a string or a number.
pub fn decimal_value(field: &str, value: &Value) -> Result<Decimal, VenueError> {
    match value {
        Value::String(s) => decimal(field, s),
        Value::Number(n) => decimal(field, &n.to_string()),
        other => Err(VenueError::Decode(format!(
            "{field}: expected number, got {other}"
        ))),
    }
}

/// Element `index` of a JSON array, as a decimal.
pub fn decimal_at(field: &str, values: &[Value], index: usize) -> Result<Decimal, VenueError> {
    let value = values
        .get(index)
        .ok_or_else(|| VenueError::Decode(format!("{field}: missing element {index}")))?;
    decimal_value(field, value)
}

/// Milliseconds since the epoch.
pub fn millis(field: &str, ms: i64) -> Result<DateTime<Utc>, VenueError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| VenueError::Decode(format!("{field}: invalid timestamp {ms}")))
}

/// Fractional seconds since the epoch, as a string (`"1616663113.1234"`) or number.
pub fn seconds_value(field: &str, value: &Value) -> Result<DateTime<Utc>, VenueError> {
    let secs = decimal_value(field, value)?;
    let ms = (secs * Decimal::ONE_THOUSAND).trunc();
    let ms = i64::try_from(ms)
        .map_err(|_| VenueError::Decode(format!("{field}: timestamp out of range")))?;
    millis(field, ms)
}

/// RFC 3339 timestamp.
pub fn rfc3339(field: &str, raw: &str) -> Result<DateTime<Utc>, VenueError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| VenueError::Decode(format!("{field}: invalid timestamp {raw:?}")))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn decimal_parses_strings_and_rejects_garbage() {
        assert_eq!(decimal("price", "37500.10000").unwrap(), dec!(37500.1));
        assert_eq!(decimal("qty", "1e-3").unwrap(), dec!(0.001));
        let err = decimal("price", "n/a").unwrap_err();
        assert!(matches!(err, VenueError::Decode(msg) if msg.contains("price")));
    }

    #[test]
    fn optional_decimal_treats_empty_as_none() {
        assert_eq!(opt_decimal("fee", Some("")).unwrap(), None);
        assert_eq!(opt_decimal("fee", None).unwrap(), None);
        assert_eq!(opt_decimal("fee", Some("0.1")).unwrap(), Some(dec!(0.1)));
    }

    #[test]
    fn decimal_value_accepts_numbers() {
        assert_eq!(decimal_value("low", &json!(1.5)).unwrap(), dec!(1.5));
        assert_eq!(decimal_value("low", &json!("2")).unwrap(), dec!(2));
        assert!(decimal_value("low", &json!(null)).is_err());
    }

    #[test]
    fn fractional_seconds_to_datetime() {
        let t = seconds_value("time", &json!("1616663113.123456")).unwrap();
        assert_eq!(t.timestamp_millis(), 1_616_663_113_123);
    }
}

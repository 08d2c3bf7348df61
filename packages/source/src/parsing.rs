//! Shared value coercion for vendor JSON.
//!
//! The search API is loose about types: identifiers arrive as strings or
//! numbers, figures as numbers or numeric strings, dates as `DD/MM/YYYY`
//! or anything else. These helpers turn a [`serde_json::Value`] into the
//! Rust type a canonical field needs, returning `None` when the value is
//! absent or unusable so callers can fall through to the next candidate.

use serde_json::Value;

/// Rewrites a `DD/MM/YYYY` date to `YYYY-MM-DD`.
///
/// Single-digit days and months are zero-padded. Any other shape is
/// returned unchanged; the result is not validated as a calendar date.
#[must_use]
pub fn rewrite_day_month_year(s: &str) -> String {
    let parts: Vec<&str> = s.trim().split('/').collect();
    let is_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());

    match parts.as_slice() {
        [day, month, year]
            if is_digits(day)
                && is_digits(month)
                && is_digits(year)
                && day.len() <= 2
                && month.len() <= 2
                && year.len() == 4 =>
        {
            format!("{year}-{month:0>2}-{day:0>2}")
        }
        _ => s.to_string(),
    }
}

/// Coerces a JSON value to a non-empty string.
///
/// Numbers and booleans are formatted, arrays of strings are joined with
/// `", "`, other arrays and objects become their JSON text. Null, empty
/// strings and empty arrays yield `None`.
#[must_use]
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) if items.iter().all(Value::is_string) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Coerces a JSON number or numeric string to `f64`.
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerces a JSON number or numeric string to a non-negative count.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

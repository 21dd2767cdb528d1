//! Loose value semantics shared by filtering, sorting and relation joins
//!
//! Query strings carry everything as text, so a stored number must match
//! its decimal string form and a stored boolean must match `"true"`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Numeric reading of a value: numbers, and strings that parse as numbers
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Parse an ISO-8601 date or date-time into epoch milliseconds
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    let bytes = text.as_bytes();
    if bytes.len() < 10 || !bytes[..4].iter().all(u8::is_ascii_digit) || bytes[4] != b'-' {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Text form used by substring matching; only strings and numbers have one
pub fn text_of(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

/// Equality with string coercion
pub fn loose_eq(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Null, Value::Null) => true,
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (as_number(stored), as_number(wanted)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        (Value::String(a), Value::String(b)) => a == b,
        _ => stored == wanted,
    }
}

/// Ordering of a stored value against a range bound
///
/// `None` means the two cannot be compared and the range test fails.
pub fn compare_to_bound(stored: &Value, bound: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(stored), as_number(bound)) {
        return a.partial_cmp(&b);
    }

    match (stored, bound) {
        (Value::String(a), Value::String(b)) => match (parse_timestamp(a), parse_timestamp(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(a.as_str().cmp(b.as_str())),
        },
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
        Value::Null => 4,
    }
}

/// Total order used for sorting
///
/// Missing and null values rank above everything else, so they land last
/// in ascending order and first in descending order.
pub fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => tx.cmp(&ty),
            _ => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Hashable key for joining records on loosely equal values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Int(i64),
    Float(u64),
    Bool(bool),
    Str(String),
}

/// Join key of a scalar value; numeric strings share the key of the number
pub fn value_key(value: &Value) -> Option<ValueKey> {
    match value {
        Value::Bool(b) => Some(ValueKey::Bool(*b)),
        Value::Number(_) | Value::String(_) => match as_number(value) {
            Some(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Some(ValueKey::Int(n as i64)),
            Some(n) => Some(ValueKey::Float(n.to_bits())),
            None => match value {
                Value::String(s) => Some(ValueKey::Str(s.clone())),
                _ => None,
            },
        },
        _ => None,
    }
}

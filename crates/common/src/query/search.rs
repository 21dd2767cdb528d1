use super::Record;
use serde_json::Value;

/// Case-insensitive substring search across a set of text fields
///
/// An empty or blank query matches every record. Non-string fields are
/// skipped.
pub fn matches_search<R, S>(record: &R, query: &str, fields: &[S]) -> bool
where
    R: Record + ?Sized,
    S: AsRef<str>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    fields.iter().any(|field| match record.field(field.as_ref()) {
        Some(Value::String(text)) => text.to_lowercase().contains(&needle),
        _ => false,
    })
}

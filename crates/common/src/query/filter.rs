//! Field filters parsed from operator-suffixed query keys
//!
//! `price_gte=10000` becomes `price >= 10000`. A key without a recognised
//! suffix, or whose field part would be empty, is an equality test on the
//! whole key.

use super::value::{compare_to_bound, loose_eq, text_of};
use super::Record;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison applied by a filter clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    Ne,
    Like,
    In,
}

impl FilterOp {
    const SUFFIXED: [(&'static str, FilterOp); 5] = [
        ("_gte", FilterOp::Gte),
        ("_lte", FilterOp::Lte),
        ("_ne", FilterOp::Ne),
        ("_like", FilterOp::Like),
        ("_in", FilterOp::In),
    ];

    /// Query-key suffix for this operator
    pub fn suffix(self) -> &'static str {
        match self {
            FilterOp::Eq => "",
            FilterOp::Gte => "_gte",
            FilterOp::Lte => "_lte",
            FilterOp::Ne => "_ne",
            FilterOp::Like => "_like",
            FilterOp::In => "_in",
        }
    }
}

/// One predicate on one field; clauses combine with AND
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FilterClause {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Equality clause
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value.into())
    }

    /// Parse a query key such as `rating_gte` into a clause
    pub fn parse(key: &str, value: Value) -> Self {
        for (suffix, op) in FilterOp::SUFFIXED {
            if let Some(field) = key.strip_suffix(suffix) {
                if !field.is_empty() {
                    return Self::new(field, op, value);
                }
            }
        }
        Self::new(key, FilterOp::Eq, value)
    }

    /// Candidate values of an `_in` clause
    fn candidates(&self) -> Vec<Value> {
        match &self.value {
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Evaluate the clause against one record
    ///
    /// A record lacking the field fails every operator except `Ne`.
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        let Some(stored) = record.field(&self.field) else {
            return self.op == FilterOp::Ne;
        };

        match self.op {
            FilterOp::Eq => loose_eq(stored, &self.value),
            FilterOp::Ne => !loose_eq(stored, &self.value),
            FilterOp::Gte => matches!(
                compare_to_bound(stored, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lte => matches!(
                compare_to_bound(stored, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Like => match (text_of(stored), text_of(&self.value)) {
                (Some(haystack), Some(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                _ => false,
            },
            FilterOp::In => self
                .candidates()
                .iter()
                .any(|candidate| loose_eq(stored, candidate)),
        }
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}={}", self.field, self.op.suffix(), self.value)
    }
}

/// True when the record satisfies every clause
pub fn matches_all<R: Record + ?Sized>(record: &R, clauses: &[FilterClause]) -> bool {
    clauses.iter().all(|clause| clause.matches(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> Value {
        json!({
            "id": 3,
            "name": "Pho Bo Tai",
            "price": 50000,
            "available": true,
            "restaurantId": 1,
            "createdAt": "2024-02-10T08:00:00Z"
        })
    }

    #[test]
    fn test_parse_suffixes() {
        let clause = FilterClause::parse("price_gte", json!("40000"));
        assert_eq!(clause.field, "price");
        assert_eq!(clause.op, FilterOp::Gte);

        let clause = FilterClause::parse("name_like", json!("pho"));
        assert_eq!(clause.op, FilterOp::Like);

        let clause = FilterClause::parse("restaurantId", json!("1"));
        assert_eq!(clause.op, FilterOp::Eq);
    }

    #[test]
    fn test_parse_keeps_unknown_or_bare_suffix_as_field() {
        let clause = FilterClause::parse("_gte", json!("1"));
        assert_eq!(clause.field, "_gte");
        assert_eq!(clause.op, FilterOp::Eq);

        let clause = FilterClause::parse("price_between", json!("1"));
        assert_eq!(clause.field, "price_between");
        assert_eq!(clause.op, FilterOp::Eq);
    }

    #[test]
    fn test_range_and_equality() {
        let record = product();
        assert!(FilterClause::parse("price_gte", json!("50000")).matches(&record));
        assert!(FilterClause::parse("price_lte", json!("60000")).matches(&record));
        assert!(!FilterClause::parse("price_lte", json!("40000")).matches(&record));
        assert!(FilterClause::parse("restaurantId", json!("1")).matches(&record));
        assert!(FilterClause::parse("available", json!("true")).matches(&record));
        assert!(FilterClause::parse("createdAt_gte", json!("2024-02-01")).matches(&record));
    }

    #[test]
    fn test_like_is_case_insensitive() {
        let record = product();
        assert!(FilterClause::parse("name_like", json!("PHO")).matches(&record));
        assert!(FilterClause::parse("price_like", json!("500")).matches(&record));
        assert!(!FilterClause::parse("name_like", json!("bun")).matches(&record));
    }

    #[test]
    fn test_in_accepts_comma_list_and_array() {
        let record = product();
        assert!(FilterClause::parse("restaurantId_in", json!("4, 1")).matches(&record));
        assert!(FilterClause::parse("restaurantId_in", json!([2, 1])).matches(&record));
        assert!(!FilterClause::parse("restaurantId_in", json!("2,3")).matches(&record));
    }

    #[test]
    fn test_missing_field_only_satisfies_ne() {
        let record = product();
        assert!(!FilterClause::parse("discount_gte", json!("0")).matches(&record));
        assert!(!FilterClause::parse("discount", json!("0")).matches(&record));
        assert!(FilterClause::parse("discount_ne", json!("0")).matches(&record));
    }

    #[test]
    fn test_matches_all_is_conjunction() {
        let record = product();
        let clauses = vec![
            FilterClause::parse("price_gte", json!("10000")),
            FilterClause::parse("name_like", json!("bo")),
        ];
        assert!(matches_all(&record, &clauses));

        let clauses = vec![
            FilterClause::parse("price_gte", json!("10000")),
            FilterClause::parse("available", json!("false")),
        ];
        assert!(!matches_all(&record, &clauses));
        assert!(matches_all(&record, &[]));
    }
}

//! Multi-key stable sorting

use super::value::sort_cmp;
use super::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Lenient parse: anything other than `desc` is ascending
    pub fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Pair comma-separated `_sort` fields with `_order` directions by position
///
/// Missing directions default to ascending.
pub fn parse_sort(sort: &str, order: Option<&str>) -> Vec<SortKey> {
    let orders: Vec<SortOrder> = order
        .map(|o| o.split(',').map(SortOrder::parse).collect())
        .unwrap_or_default();

    sort.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .enumerate()
        .map(|(i, field)| SortKey {
            field: field.to_string(),
            order: orders.get(i).copied().unwrap_or_default(),
        })
        .collect()
}

/// Cascade comparison: the first key that differs decides
pub fn compare_records<R: Record + ?Sized>(a: &R, b: &R, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = sort_cmp(a.field(&key.field), b.field(&key.field));
        let ordering = match key.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable in-place sort; equal records keep their original order
pub fn sort_records<R: Record>(records: &mut [R], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    records.sort_by(|a, b| compare_records(a, b, keys));
}

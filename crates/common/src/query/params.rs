//! Query-string decoding into [`QueryOptions`]

use super::filter::FilterClause;
use super::pagination::PageRequest;
use super::sort::parse_sort;
use super::QueryOptions;
use serde_json::Value;

/// Reserved query keys; every other key is a filter
pub const RESERVED_KEYS: [&str; 7] = ["_page", "_limit", "_sort", "_order", "_embed", "_expand", "q"];

fn positive(text: &str) -> Option<usize> {
    text.trim().parse::<i64>().ok().filter(|n| *n > 0).map(|n| n as usize)
}

fn names(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

impl QueryOptions {
    /// Decode query-string pairs
    ///
    /// Invalid, zero or negative `_page`/`_limit` fall back to page 1 and
    /// `default_limit`. Repeated `_embed`/`_expand` keys accumulate.
    pub fn from_pairs<I, K, V>(pairs: I, default_limit: usize) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = QueryOptions::default();
        let mut page = None;
        let mut limit = None;
        let mut sort = None;
        let mut order = None;

        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "_page" => page = positive(value),
                "_limit" => limit = positive(value),
                "_sort" => sort = Some(value.to_string()),
                "_order" => order = Some(value.to_string()),
                "_embed" => options.embed.extend(names(value)),
                "_expand" => options.expand.extend(names(value)),
                "q" => options.q = Some(value.to_string()).filter(|q| !q.trim().is_empty()),
                other => options
                    .filter
                    .push(FilterClause::parse(other, Value::String(value.to_string()))),
            }
        }

        if let Some(sort) = sort {
            options.sort = parse_sort(&sort, order.as_deref());
        }
        options.page = PageRequest::new(page.unwrap_or(1), limit.unwrap_or(default_limit));
        options
    }
}

use serde::{Deserialize, Serialize};

/// Page size used when the caller does not ask for one
pub const DEFAULT_LIMIT: usize = 10;

/// Requested page window; both values are at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    limit: usize,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of records skipped before this page
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_LIMIT)
    }
}

/// Pagination metadata returned alongside every list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(request: PageRequest, total: usize) -> Self {
        let total_pages = total.div_ceil(request.limit);
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages,
            has_next: request.page < total_pages,
            has_prev: request.page > 1,
        }
    }
}

/// Cut one page out of `items` and describe it
///
/// A page past the end yields no data but still reports the real total.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> (Vec<T>, Pagination) {
    let pagination = Pagination::new(request, items.len());
    let page = items
        .into_iter()
        .skip(request.offset())
        .take(request.limit)
        .collect();
    (page, pagination)
}

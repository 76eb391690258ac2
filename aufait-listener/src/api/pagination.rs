//! Page/perPage query parameters and the paginated response envelope.
//!
//! Malformed numbers fall back to the defaults rather than failing the
//! request.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: usize = 100;
pub const MAX_PER_PAGE: usize = 1000;

/// Raw query values, parsed leniently by the accessors.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub per_page: Option<String>,
}

fn parse_or(value: Option<&str>, default: i64) -> i64 {
    value
        .map(str::trim)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl PageQuery {
    /// 1-based page number.
    pub fn page(&self) -> usize {
        parse_or(self.page.as_deref(), 1).max(1) as usize
    }

    /// Non-positive sizes mean the default.
    pub fn per_page(&self) -> usize {
        match parse_or(self.per_page.as_deref(), DEFAULT_PER_PAGE as i64) {
            n if n <= 0 => DEFAULT_PER_PAGE,
            n => (n as usize).min(MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedList<T> {
    pub page: usize,
    pub per_page: usize,
    pub page_count: usize,
    pub total_count: usize,
    pub items: Vec<T>,
}

impl<T> PaginatedList<T> {
    pub fn new(query: &PageQuery, items: Vec<T>, total_count: usize) -> Self {
        let per_page = query.per_page();
        Self {
            page: query.page(),
            per_page,
            page_count: total_count.div_ceil(per_page),
            total_count,
            items,
        }
    }
}

/// Page/per-page handling
///
/// Client-supplied values are clamped, never rejected: a `per_page` outside
/// `[min_limit, max_limit]` is pulled back into range and a page below 1
/// becomes 1.

use serde::Serialize;

/// Configured bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub default_limit: i64,
    pub min_limit: i64,
    pub max_limit: i64,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            min_limit: 1,
            max_limit: 100,
        }
    }
}

/// A clamped page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(page: Option<i64>, per_page: Option<i64>, limits: &PaginationLimits) -> Self {
        let min = limits.min_limit.max(1);
        let max = limits.max_limit.max(min);

        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(limits.default_limit).clamp(min, max),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        PageMeta {
            page: self.page,
            per_page: self.per_page,
            total,
            total_pages: total_pages(total, self.per_page),
        }
    }
}

/// The envelope's `pagination` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

pub fn total_pages(total: i64, per_page: i64) -> i64 {
    if total <= 0 || per_page <= 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

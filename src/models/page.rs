//! Pagination descriptor.

use serde::{Deserialize, Serialize};

/// Pagination request plus the totals a counted listing writes back.
///
/// `total` and `total_pages` are outputs: they are overwritten by every
/// `list` call the page is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub p: u64,
    /// Page size.
    pub limit: u64,
    /// Matching rows across all pages.
    #[serde(default)]
    pub total: u64,
    /// Number of pages (`ceil(total / limit)`).
    #[serde(default, alias = "total_page")]
    pub total_pages: u64,
}

impl Page {
    /// Creates a page request. Page number and size are clamped to at least 1.
    #[must_use]
    pub const fn new(p: u64, limit: u64) -> Self {
        Self {
            p: if p == 0 { 1 } else { p },
            limit: if limit == 0 { 1 } else { limit },
            total: 0,
            total_pages: 0,
        }
    }

    /// Row offset of the first record on this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.p.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Records the total row count and derives the page count.
    pub const fn record_total(&mut self, total: u64) {
        self.total = total;
        self.total_pages = if self.limit == 0 {
            0
        } else {
            total.div_ceil(self.limit)
        };
    }

    /// Zeroes the totals without counting.
    pub const fn reset_totals(&mut self) {
        self.total = 0;
        self.total_pages = 0;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

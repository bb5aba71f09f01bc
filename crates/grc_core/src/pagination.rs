//! Pagination contract emitted to the transport layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

/// Per-endpoint defaults and caps.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

pub const LIST_LIMITS: PageLimits = PageLimits {
    default_per_page: 25,
    max_per_page: 100,
};

pub const COMMENT_LIMITS: PageLimits = PageLimits {
    default_per_page: 50,
    max_per_page: 200,
};

pub const EVALUATION_LIMITS: PageLimits = PageLimits {
    default_per_page: 20,
    max_per_page: 50,
};

impl PageRequest {
    /// Normalises raw caller input: page defaults to 1, per_page to the
    /// endpoint default, and both are clamped to sane bounds.
    pub fn new(page: Option<u32>, per_page: Option<u32>, limits: PageLimits) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(limits.default_per_page)
                .clamp(1, limits.max_per_page),
        }
    }

    /// Re-applies an endpoint's bounds to a request that may have been
    /// deserialized directly.
    pub fn within(self, limits: PageLimits) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, limits.max_per_page),
        }
    }

    pub fn first(limits: PageLimits) -> Self {
        Self::new(None, None, limits)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }

    /// Applies the window to an already filtered and ordered collection.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset() as usize)
            .take(self.per_page as usize)
            .cloned()
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(LIST_LIMITS)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages: total.div_ceil(u64::from(request.per_page.max(1))),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_caps() {
        let req = PageRequest::new(None, None, LIST_LIMITS);
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, 25);

        let capped = PageRequest::new(Some(0), Some(10_000), COMMENT_LIMITS);
        assert_eq!(capped.page, 1);
        assert_eq!(capped.per_page, 200);

        let evals = PageRequest::new(Some(2), Some(51), EVALUATION_LIMITS);
        assert_eq!(evals.per_page, 50);
        assert_eq!(evals.offset(), 50);
    }

    #[test]
    fn total_pages_rounds_up() {
        let req = PageRequest::new(Some(1), Some(10), LIST_LIMITS);
        assert_eq!(Page::new(Vec::<u8>::new(), req, 0).total_pages, 0);
        assert_eq!(Page::new(Vec::<u8>::new(), req, 10).total_pages, 1);
        assert_eq!(Page::new(Vec::<u8>::new(), req, 11).total_pages, 2);
    }

    #[test]
    fn within_clamps_raw_requests() {
        let raw = PageRequest {
            page: 0,
            per_page: 10_000,
        };
        assert_eq!(
            raw.within(COMMENT_LIMITS),
            PageRequest {
                page: 1,
                per_page: 200
            }
        );
        let zero = PageRequest {
            page: 3,
            per_page: 0,
        };
        assert_eq!(zero.within(LIST_LIMITS).per_page, 1);
        assert_eq!(zero.within(LIST_LIMITS).page, 3);
    }

    #[test]
    fn zero_per_page_does_not_divide_by_zero() {
        let raw = PageRequest {
            page: 1,
            per_page: 0,
        };
        assert_eq!(Page::new(Vec::<u8>::new(), raw, 5).total_pages, 5);
    }

    #[test]
    fn slice_windows_items() {
        let req = PageRequest::new(Some(2), Some(2), LIST_LIMITS);
        assert_eq!(req.slice(&[1, 2, 3, 4, 5]), vec![3, 4]);
        let past_end = PageRequest::new(Some(9), Some(2), LIST_LIMITS);
        assert!(past_end.slice(&[1, 2, 3]).is_empty());
    }
}

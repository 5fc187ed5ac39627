use serde::Serialize;

/// Validated 1-based pagination window.
///
/// Non-positive values fall back to the defaults and `limit` is capped, so a
/// hostile `limit=100000` cannot turn a list endpoint into a table scan.
/// Non-numeric input never reaches this type; the typed request schemas
/// reject it at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    page: i64,
    limit: i64,
}

impl PageParams {
    pub const DEFAULT_PAGE: i64 = 1;
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p,
            _ => Self::DEFAULT_PAGE,
        };
        let limit = match limit {
            Some(l) if l >= 1 => l.min(Self::MAX_LIMIT),
            _ => Self::DEFAULT_LIMIT,
        };
        Self { page, limit }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::from_query(None, None)
    }
}

/// One page of a filtered+sorted+joined result set, with totals computed
/// over the same predicate. Field names mirror the public API surface.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub total_docs: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(docs: Vec<T>, total_docs: i64, params: PageParams) -> Self {
        let total_pages = if total_docs == 0 {
            0
        } else {
            (total_docs + params.limit() - 1) / params.limit()
        };
        Self {
            docs,
            total_docs,
            page: params.page(),
            limit: params.limit(),
            total_pages,
        }
    }

    /// Expected slice length for this window: `min(limit, total - offset)`
    /// clamped to zero. The store returns exactly this many rows.
    pub fn expected_len(total_docs: i64, params: PageParams) -> i64 {
        (total_docs - params.offset()).clamp(0, params.limit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_for_missing_values() {
        let p = PageParams::from_query(None, None);
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 10);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn non_positive_values_fall_back_to_defaults() {
        let p = PageParams::from_query(Some(0), Some(-5));
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 10);
    }

    #[test]
    fn limit_is_capped() {
        let p = PageParams::from_query(Some(3), Some(100_000));
        assert_eq!(p.limit(), PageParams::MAX_LIMIT);
        assert_eq!(p.offset(), 2 * PageParams::MAX_LIMIT);
    }

    #[test]
    fn expected_len_clamps_past_the_end() {
        // 25 rows, pages of 10: pages hold 10, 10, 5, 0
        let len = |page| {
            Page::<()>::expected_len(25, PageParams::from_query(Some(page), Some(10)))
        };
        assert_eq!(len(1), 10);
        assert_eq!(len(2), 10);
        assert_eq!(len(3), 5);
        assert_eq!(len(4), 0);
    }

    #[test]
    fn total_pages_rounds_up() {
        let params = PageParams::from_query(Some(1), Some(10));
        assert_eq!(Page::new(vec![(); 10], 25, params).total_pages, 3);
        assert_eq!(Page::new(vec![(); 10], 30, params).total_pages, 3);
        assert_eq!(Page::<()>::new(vec![], 0, params).total_pages, 0);
    }
}

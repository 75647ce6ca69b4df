//! Page queries and cursors

use crate::feed::FeedKey;
use crate::source::Filter;

/// Timestamp boundary of the oldest item a feed holds
///
/// The next page asks for records strictly older than the cursor, so the
/// boundary item is never fetched twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(i64);

impl Cursor {
    /// Cursor at the given oldest-seen timestamp
    pub fn new(oldest_seen: i64) -> Self {
        Self(oldest_seen)
    }

    /// Oldest-seen timestamp
    pub fn timestamp(self) -> i64 {
        self.0
    }

    /// Inclusive `until` bound for the next page
    pub fn until(self) -> i64 {
        self.0.saturating_sub(1)
    }
}

/// Which page a query fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Newest page, no cursor
    Initial,
    /// Page strictly older than the cursor
    Older(Cursor),
}

/// One bounded page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Which page
    pub kind: PageKind,
    /// Filter sent to every source
    pub filter: Filter,
    /// Requested page size
    pub limit: usize,
}

impl PageQuery {
    /// Query for the newest page of a feed
    pub fn initial(key: &FeedKey, limit: usize) -> Self {
        Self {
            kind: PageKind::Initial,
            filter: key.base_filter().limit(limit),
            limit,
        }
    }

    /// Query for the page before `cursor`
    pub fn older(key: &FeedKey, cursor: Cursor, limit: usize) -> Self {
        Self {
            kind: PageKind::Older(cursor),
            filter: key.base_filter().until(cursor.until()).limit(limit),
            limit,
        }
    }

    /// Whether this query continues from a cursor
    pub fn is_continuation(&self) -> bool {
        matches!(self.kind, PageKind::Older(_))
    }

    /// `has_more` rule: a full page means there may be another
    pub fn has_more_after(&self, result_count: usize) -> bool {
        result_count >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::OwnerId;

    #[test]
    fn test_cursor_exclusive_boundary() {
        let cursor = Cursor::new(500);
        assert_eq!(cursor.until(), 499);
        assert_eq!(Cursor::new(i64::MIN).until(), i64::MIN);
    }

    #[test]
    fn test_older_query_for_profile() {
        let query = PageQuery::older(&FeedKey::profile("alice"), Cursor::new(500), 50);

        assert!(query.is_continuation());
        assert_eq!(query.filter.owner, Some(OwnerId::new("alice")));
        assert_eq!(query.filter.until, Some(499));
        assert_eq!(query.filter.limit, Some(50));
    }

    #[test]
    fn test_initial_query_is_global_for_discovery() {
        let query = PageQuery::initial(&FeedKey::Discovery, 20);

        assert!(!query.is_continuation());
        assert!(query.filter.owner.is_none());
        assert!(query.filter.until.is_none());
        assert_eq!(query.filter.limit, Some(20));
    }

    #[test]
    fn test_has_more_rule() {
        let query = PageQuery::initial(&FeedKey::Discovery, 50);
        assert!(query.has_more_after(50));
        assert!(query.has_more_after(51));
        assert!(!query.has_more_after(49));
    }
}

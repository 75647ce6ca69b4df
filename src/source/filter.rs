//! Subscription filters

use crate::content::{ContentRecord, OwnerId};

/// Which records a subscription asks for
///
/// `since` and `until` are inclusive bounds on `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Only records from this owner
    pub owner: Option<OwnerId>,
    /// Only records carrying this tag
    pub tag: Option<String>,
    /// Lower bound on `created_at`
    pub since: Option<i64>,
    /// Upper bound on `created_at`
    pub until: Option<i64>,
    /// Maximum number of stored records to return
    pub limit: Option<usize>,
}

impl Filter {
    /// An unrestricted filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one owner
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Restrict to one tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the lower time bound
    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the upper time bound
    pub fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    /// Cap the number of stored records
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record satisfies every bound of the filter
    pub fn matches(&self, record: &ContentRecord) -> bool {
        if let Some(ref owner) = self.owner {
            if &record.owner_id != owner {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !record.has_tag(tag) {
                return false;
            }
        }
        if self.since.is_some_and(|since| record.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| record.created_at > until) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_matches_all() {
        let record = ContentRecord::new("a", "alice", 10, "u");
        assert!(Filter::new().matches(&record));
    }

    #[test]
    fn test_owner_and_tag() {
        let record = ContentRecord::new("a", "alice", 10, "u").with_tag("dance");

        assert!(Filter::new().owner("alice".into()).matches(&record));
        assert!(!Filter::new().owner("bob".into()).matches(&record));
        assert!(Filter::new().tag("#Dance").matches(&record));
        assert!(!Filter::new().tag("music").matches(&record));
    }

    #[test]
    fn test_time_bounds_inclusive() {
        let record = ContentRecord::new("a", "alice", 100, "u");

        assert!(Filter::new().until(100).matches(&record));
        assert!(!Filter::new().until(99).matches(&record));
        assert!(Filter::new().since(100).matches(&record));
        assert!(!Filter::new().since(101).matches(&record));
    }
}

//! Feed ordering rules
//!
//! Every rule ends with `id` ascending so that sorting is total and
//! deterministic regardless of arrival order.

use std::cmp::Ordering;

use super::record::ContentRecord;

/// How a feed orders its items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedOrdering {
    /// `created_at` descending
    #[default]
    Recency,
    /// Loop count descending, then `created_at` descending
    LoopsFirst,
}

impl FeedOrdering {
    /// Compare two records under this rule
    pub fn compare(self, a: &ContentRecord, b: &ContentRecord) -> Ordering {
        let primary = match self {
            FeedOrdering::Recency => Ordering::Equal,
            FeedOrdering::LoopsFirst => b.loops().cmp(&a.loops()),
        };

        primary
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Sort records in place
    pub fn sort(self, records: &mut [ContentRecord]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, t: i64, loops: u64) -> ContentRecord {
        ContentRecord::new(id, "owner", t, "u").with_loops(loops)
    }

    fn ids(records: &[ContentRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_recency_order() {
        let mut items = vec![rec("a", 100, 9), rec("b", 200, 0), rec("c", 150, 3)];
        FeedOrdering::Recency.sort(&mut items);
        assert_eq!(ids(&items), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_loops_first_order() {
        let mut items = vec![
            rec("a", 100, 5),
            rec("b", 300, 5),
            rec("c", 500, 1),
            rec("d", 50, 10),
        ];
        FeedOrdering::LoopsFirst.sort(&mut items);
        assert_eq!(ids(&items), vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut items = vec![rec("z", 100, 1), rec("m", 100, 1), rec("a", 100, 1)];
        FeedOrdering::LoopsFirst.sort(&mut items);
        assert_eq!(ids(&items), vec!["a", "m", "z"]);
    }

    #[test]
    fn test_ordering_invariant_holds_pairwise() {
        let mut items: Vec<ContentRecord> = (0..40)
            .map(|i| rec(&format!("id{:02}", (i * 7) % 40), (i % 5) as i64 * 10, (i % 3) as u64))
            .collect();
        FeedOrdering::LoopsFirst.sort(&mut items);

        for pair in items.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.loops() >= b.loops());
            if a.loops() == b.loops() {
                assert!(a.created_at >= b.created_at);
                if a.created_at == b.created_at {
                    assert!(a.id < b.id);
                }
            }
        }
    }
}

//! Feed identity
//!
//! A [`FeedKey`] names one logical feed. It decides the ordering rule and the
//! filters sent to sources, and it keys the initial-page cache.

use crate::content::{FeedOrdering, OwnerId};
use crate::source::Filter;

/// Identifier of a logical feed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedKey {
    /// Global recent content
    Discovery,
    /// Global content ranked by engagement
    Popular,
    /// One owner's content
    Profile(OwnerId),
    /// Content carrying a hashtag
    Hashtag(String),
}

impl FeedKey {
    /// Feed for one owner
    pub fn profile(owner: impl Into<String>) -> Self {
        FeedKey::Profile(OwnerId::new(owner))
    }

    /// Feed for one hashtag (normalized to lowercase, `#` stripped)
    pub fn hashtag(tag: &str) -> Self {
        FeedKey::Hashtag(tag.trim_start_matches('#').to_ascii_lowercase())
    }

    /// Ordering rule for this feed
    pub fn ordering(&self) -> FeedOrdering {
        match self {
            FeedKey::Popular => FeedOrdering::LoopsFirst,
            _ => FeedOrdering::Recency,
        }
    }

    /// Whether queries are scoped to one owner
    pub fn is_owner_scoped(&self) -> bool {
        matches!(self, FeedKey::Profile(_))
    }

    /// Scope filter without time bounds
    pub fn base_filter(&self) -> Filter {
        match self {
            FeedKey::Discovery | FeedKey::Popular => Filter::new(),
            FeedKey::Profile(owner) => Filter::new().owner(owner.clone()),
            FeedKey::Hashtag(tag) => Filter::new().tag(tag.clone()),
        }
    }

    /// Filter for a live-only subscription (no stored records)
    pub fn live_filter(&self) -> Filter {
        self.base_filter().limit(0)
    }
}

impl std::fmt::Display for FeedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKey::Discovery => write!(f, "discovery"),
            FeedKey::Popular => write!(f, "popular"),
            FeedKey::Profile(owner) => write!(f, "profile:{}", owner),
            FeedKey::Hashtag(tag) => write!(f, "hashtag:{}", tag),
        }
    }
}

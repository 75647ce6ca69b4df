//! Feed state snapshots and the subscription lifecycle

use crate::content::{ContentId, ContentRecord};
use crate::error::{Error, ErrorKind};

/// Live subscription lifecycle
///
/// `Idle → Subscribing → Active → (Error | Stopped)`. A stopped or failed
/// feed may subscribe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionPhase {
    /// Never started
    #[default]
    Idle,
    /// Waiting for sources to accept
    Subscribing,
    /// At least one live subscription is running
    Active,
    /// Every live subscription failed
    Error,
    /// Stopped by the owner or every source closed
    Stopped,
}

impl SubscriptionPhase {
    /// Whether `start` should (re)subscribe from this phase
    pub fn can_start(self) -> bool {
        matches!(
            self,
            SubscriptionPhase::Idle | SubscriptionPhase::Stopped | SubscriptionPhase::Error
        )
    }

    /// Whether live subscriptions are running or being opened
    pub fn is_running(self) -> bool {
        matches!(self, SubscriptionPhase::Subscribing | SubscriptionPhase::Active)
    }
}

/// Error surfaced on a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    /// Classification
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl From<&Error> for FeedError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Immutable snapshot of a feed
#[derive(Debug, Clone)]
pub struct FeedState {
    /// Items in feed order
    pub items: Vec<ContentRecord>,
    /// Initial page is loading
    pub is_loading_initial: bool,
    /// An older page is loading
    pub is_loading_more: bool,
    /// Older pages may exist
    pub has_more: bool,
    /// Minimum `created_at` across `items`
    pub oldest_seen_timestamp: Option<i64>,
    /// Last feed-level error, until the next success or `clear_error`
    pub error: Option<FeedError>,
    /// Live subscription phase
    pub phase: SubscriptionPhase,
    /// Emission counter, strictly increasing
    pub generation: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            is_loading_initial: false,
            is_loading_more: false,
            has_more: true,
            oldest_seen_timestamp: None,
            error: None,
            phase: SubscriptionPhase::Idle,
            generation: 0,
        }
    }
}

impl FeedState {
    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item identifiers in feed order
    pub fn ids(&self) -> Vec<&ContentId> {
        self.items.iter().map(|r| &r.id).collect()
    }

    /// Whether the UI should offer a retry action instead of an empty state
    pub fn needs_retry_action(&self) -> bool {
        self.items.is_empty() && self.error.is_some() && !self.is_loading_initial
    }

    /// Whether `load_more` would currently issue a query
    pub fn can_load_more(&self) -> bool {
        !self.is_loading_more && self.has_more && self.oldest_seen_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        assert!(SubscriptionPhase::Idle.can_start());
        assert!(SubscriptionPhase::Stopped.can_start());
        assert!(SubscriptionPhase::Error.can_start());
        assert!(!SubscriptionPhase::Active.can_start());
        assert!(!SubscriptionPhase::Subscribing.can_start());
        assert!(SubscriptionPhase::Active.is_running());
    }

    #[test]
    fn test_default_state() {
        let state = FeedState::default();
        assert!(state.is_empty());
        assert!(state.has_more);
        assert!(!state.can_load_more());
        assert!(!state.needs_retry_action());
    }

    #[test]
    fn test_retry_action() {
        let state = FeedState {
            error: Some(FeedError::from(&Error::Timeout)),
            ..Default::default()
        };
        assert!(state.needs_retry_action());

        let loaded = FeedState {
            items: vec![ContentRecord::new("a", "o", 1, "u")],
            ..state
        };
        assert!(!loaded.needs_retry_action());
    }

    #[test]
    fn test_can_load_more() {
        let state = FeedState {
            oldest_seen_timestamp: Some(500),
            ..Default::default()
        };
        assert!(state.can_load_more());

        let busy = FeedState {
            is_loading_more: true,
            ..state.clone()
        };
        assert!(!busy.can_load_more());

        let exhausted = FeedState {
            has_more: false,
            ..state
        };
        assert!(!exhausted.can_load_more());
    }
}

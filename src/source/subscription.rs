//! Subscription channel between a source and its consumer
//!
//! A [`Subscription`] is the consumer end; the source keeps the matching
//! [`SubscriptionSender`]. Both share a cancellation token. Dropping or
//! cancelling the subscription cancels the token, which tells the source to
//! stop producing (close the relay request) rather than having its output
//! silently ignored.

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::content::ContentRecord;

/// Default channel depth for a subscription
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

/// Event delivered by a source
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A content record (not yet validated)
    Record(ContentRecord),
    /// All stored records matching the filter have been delivered
    EndOfStoredEvents,
    /// The subscription failed at the source
    Error(String),
}

/// Consumer end of a subscription
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<SourceEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Create a connected sender/subscription pair
    pub fn channel(capacity: usize) -> (SubscriptionSender, Subscription) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        let sender = SubscriptionSender {
            tx,
            cancel: cancel.clone(),
        };

        (sender, Subscription { rx, cancel })
    }

    /// Receive the next event
    ///
    /// Returns `None` once the source closed the stream or the subscription
    /// was cancelled.
    pub async fn next(&mut self) -> Option<SourceEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Cancel at the source. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the subscription was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Producer end of a subscription, held by the source
#[derive(Debug, Clone)]
pub struct SubscriptionSender {
    tx: mpsc::Sender<SourceEvent>,
    cancel: CancellationToken,
}

impl SubscriptionSender {
    /// Deliver an event
    ///
    /// Returns false when the consumer is gone and production should stop.
    pub async fn send(&self, event: SourceEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Whether the consumer cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the consumer cancels
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_in_order() {
        let (tx, mut sub) = Subscription::channel(8);

        assert!(tx.send(SourceEvent::Record(ContentRecord::new("a", "o", 1, "u"))).await);
        assert!(tx.send(SourceEvent::EndOfStoredEvents).await);
        drop(tx);

        assert!(matches!(sub.next().await, Some(SourceEvent::Record(_))));
        assert!(matches!(sub.next().await, Some(SourceEvent::EndOfStoredEvents)));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_cancels_source_side() {
        let (tx, sub) = Subscription::channel(8);
        assert!(!tx.is_cancelled());

        drop(sub);

        assert!(tx.is_cancelled());
        assert!(!tx.send(SourceEvent::EndOfStoredEvents).await);
        tx.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (_tx, mut sub) = Subscription::channel(8);
        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert!(sub.next().await.is_none());
    }
}

//! In-process content source
//!
//! Holds records in memory and serves subscriptions the way a relay does:
//! stored matches (newest first, up to `limit`), the end-of-stored marker,
//! then live publications. Used by tests and demos, and handy as a local
//! loopback source.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::content::{ContentRecord, FeedOrdering};
use crate::error::{Error, Result};

use super::filter::Filter;
use super::subscription::{SourceEvent, Subscription, DEFAULT_SUBSCRIPTION_CAPACITY};
use super::ContentSource;

/// In-memory relay
pub struct MemorySource {
    name: String,
    records: Mutex<Vec<ContentRecord>>,
    live_tx: broadcast::Sender<SourceEvent>,
    refuse_subscriptions: AtomicBool,
    send_end_of_stored: AtomicBool,
    subscribe_calls: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new(name: impl Into<String>) -> Self {
        let (live_tx, _) = broadcast::channel(1024);

        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
            live_tx,
            refuse_subscriptions: AtomicBool::new(false),
            send_end_of_stored: AtomicBool::new(true),
            subscribe_calls: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a source preloaded with stored records
    pub fn with_records(name: impl Into<String>, records: Vec<ContentRecord>) -> Self {
        let source = Self::new(name);
        source.store(records);
        source
    }

    /// Add stored records without notifying live subscribers
    ///
    /// Records without a raw body get their encoded event attached, the
    /// way a relay hands out the event it stored.
    pub fn store(&self, records: Vec<ContentRecord>) {
        if let Ok(mut stored) = self.records.lock() {
            stored.extend(records.into_iter().map(with_wire_body));
        }
    }

    /// Store a record and deliver it to live subscribers
    pub fn publish(&self, record: ContentRecord) {
        let record = with_wire_body(record);
        self.store(vec![record.clone()]);
        let _ = self.live_tx.send(SourceEvent::Record(record));
    }

    /// Deliver a subscription-level error to live subscribers
    pub fn fail_live(&self, message: impl Into<String>) {
        let _ = self.live_tx.send(SourceEvent::Error(message.into()));
    }

    /// Make subsequent `subscribe` calls fail
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.store(refuse, Ordering::Relaxed);
    }

    /// Withhold the end-of-stored marker (simulates a relay that never
    /// finishes a query)
    pub fn withhold_end_of_stored(&self, withhold: bool) {
        self.send_end_of_stored.store(!withhold, Ordering::Relaxed);
    }

    /// Number of `subscribe` calls so far
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::Relaxed)
    }

    /// Number of subscriptions still being served
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn stored_matches(&self, filter: &Filter) -> Vec<ContentRecord> {
        let mut matches: Vec<ContentRecord> = match self.records.lock() {
            Ok(stored) => stored.iter().filter(|r| filter.matches(r)).cloned().collect(),
            Err(_) => Vec::new(),
        };

        FeedOrdering::Recency.sort(&mut matches);
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        matches
    }
}

fn with_wire_body(record: ContentRecord) -> ContentRecord {
    if record.raw.is_empty() {
        let raw = record.encode_event();
        record.with_raw(raw)
    } else {
        record
    }
}

#[async_trait::async_trait]
impl ContentSource for MemorySource {
    async fn subscribe(&self, filter: &Filter) -> Result<Subscription> {
        self.subscribe_calls.fetch_add(1, Ordering::Relaxed);

        if self.refuse_subscriptions.load(Ordering::Relaxed) {
            return Err(Error::Source(format!("{} refused subscription", self.name)));
        }

        let (tx, subscription) = Subscription::channel(DEFAULT_SUBSCRIPTION_CAPACITY);
        let stored = self.stored_matches(filter);
        let send_eose = self.send_end_of_stored.load(Ordering::Relaxed);
        let mut live_rx = self.live_tx.subscribe();
        let filter = filter.clone();
        let active = Arc::clone(&self.active);
        let name = self.name.clone();

        active.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let mut open = true;

            for record in stored {
                if !tx.send(SourceEvent::Record(record)).await {
                    open = false;
                    break;
                }
            }

            if open && send_eose {
                open = tx.send(SourceEvent::EndOfStoredEvents).await;
            }

            while open {
                tokio::select! {
                    _ = tx.cancelled() => break,
                    event = live_rx.recv() => match event {
                        Ok(SourceEvent::Record(record)) if filter.matches(&record) => {
                            open = tx.send(SourceEvent::Record(record)).await;
                        }
                        Ok(SourceEvent::Record(_)) => {}
                        Ok(other) => open = tx.send(other).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(source = %name, skipped, "Live subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }

            active.fetch_sub(1, Ordering::Relaxed);
            tracing::trace!(source = %name, "Subscription finished");
        });

        Ok(subscription)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rec(id: &str, t: i64) -> ContentRecord {
        ContentRecord::new(id, "alice", t, format!("https://cdn/{}.mp4", id))
    }

    #[tokio::test]
    async fn test_stored_then_eose_then_live() {
        let source = MemorySource::with_records("relay", vec![rec("a", 1), rec("b", 2)]);
        let mut sub = source.subscribe(&Filter::new()).await.unwrap();

        let mut ids = Vec::new();
        loop {
            match sub.next().await {
                Some(SourceEvent::Record(r)) => ids.push(r.id.to_string()),
                Some(SourceEvent::EndOfStoredEvents) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(ids, vec!["b", "a"]);

        source.publish(rec("c", 3));
        match sub.next().await {
            Some(SourceEvent::Record(r)) => assert_eq!(r.id.as_str(), "c"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_limit_and_until() {
        let source =
            MemorySource::with_records("relay", (1..=10).map(|i| rec(&format!("r{}", i), i)).collect());
        let mut sub = source
            .subscribe(&Filter::new().until(6).limit(3))
            .await
            .unwrap();

        let mut times = Vec::new();
        while let Some(SourceEvent::Record(r)) = sub.next().await {
            times.push(r.created_at);
        }
        assert_eq!(times, vec![6, 5, 4]);
    }

    #[tokio::test]
    async fn test_refused() {
        let source = MemorySource::new("relay");
        source.refuse_subscriptions(true);
        assert!(source.subscribe(&Filter::new()).await.is_err());
        assert_eq!(source.subscribe_calls(), 1);
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_source() {
        let source = MemorySource::with_records("relay", vec![rec("a", 1)]);
        let sub = source.subscribe(&Filter::new()).await.unwrap();
        assert_eq!(source.active_subscriptions(), 1);

        drop(sub);

        for _ in 0..50 {
            if source.active_subscriptions() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(source.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_records_carry_raw_body() {
        let supplied = bytes::Bytes::from_static(b"{\"kind\":34236}");
        let source = MemorySource::with_records(
            "relay",
            vec![rec("a", 1).with_raw(supplied.clone()), rec("b", 2)],
        );
        let mut sub = source.subscribe(&Filter::new()).await.unwrap();

        let mut bodies = Vec::new();
        while let Some(SourceEvent::Record(r)) = sub.next().await {
            bodies.push((r.id.to_string(), r.raw.clone()));
        }
        assert_eq!(bodies[0], ("b".to_string(), rec("b", 2).encode_event()));
        assert_eq!(bodies[1], ("a".to_string(), supplied));

        source.publish(rec("c", 3));
        match sub.next().await {
            Some(SourceEvent::Record(r)) => assert_eq!(r.raw, rec("c", 3).encode_event()),
            other => panic!("unexpected {:?}", other),
        }
    }
}

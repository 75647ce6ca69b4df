//! Ingestion and deduplication pipeline
//!
//! The pipeline is the synchronous core of a feed: it owns the seen-set, the
//! last emitted list, the debounced candidate and the side buffer. It never
//! spawns or sleeps; the feed task feeds it records and asks it when the
//! debounce deadline is due. Keeping it synchronous makes every ordering and
//! dedup rule testable without a runtime.
//!
//! ```text
//!  record ──► validate ──► seen? ──yes──► drop (duplicate)
//!                             │no
//!                buffering? ──┼──yes──► side buffer ──load_buffered()──► front of list
//!                             │no
//!                             ▼
//!                    debounced candidate ──window elapsed──► emit (if changed)
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::content::{ContentId, ContentRecord, FeedOrdering};
use crate::debounce::Debouncer;
use crate::stats::IngestStats;

/// What happened to one ingested record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Id already seen; discarded
    Duplicate,
    /// Failed validation; discarded
    Malformed,
    /// Added to the side buffer, which now holds this many records
    Buffered(usize),
    /// Added to the debounced candidate
    Pending,
}

/// Result of merging a fetched page
#[derive(Debug, Clone)]
pub struct PageMerge {
    /// Records from the page that were new to the feed
    pub added: usize,
    /// The emitted list after the merge
    pub items: Vec<ContentRecord>,
}

/// Ordered, deduplicated item list with debounce and buffering
#[derive(Debug)]
pub struct IngestPipeline {
    ordering: FeedOrdering,
    seen: HashSet<ContentId>,
    emitted: Vec<ContentRecord>,
    debouncer: Debouncer<Vec<ContentRecord>>,
    buffering: bool,
    buffer: Vec<ContentRecord>,
    stats: IngestStats,
}

fn same_identity_sequence(a: &Vec<ContentRecord>, b: &Vec<ContentRecord>) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.id == y.id)
}

impl IngestPipeline {
    /// Create a pipeline with the given ordering rule and debounce window
    pub fn new(ordering: FeedOrdering, window: Duration) -> Self {
        Self {
            ordering,
            seen: HashSet::new(),
            emitted: Vec::new(),
            debouncer: Debouncer::with_predicate(window, same_identity_sequence),
            buffering: false,
            buffer: Vec::new(),
            stats: IngestStats::new(),
        }
    }

    /// Ordering rule
    pub fn ordering(&self) -> FeedOrdering {
        self.ordering
    }

    /// Last emitted list
    pub fn items(&self) -> &[ContentRecord] {
        &self.emitted
    }

    /// Counters
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Whether the id has been seen in this pipeline's lifetime
    pub fn has_seen(&self, id: &ContentId) -> bool {
        self.seen.contains(id)
    }

    /// Minimum `created_at` across the emitted list
    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.emitted.iter().map(|r| r.created_at).min()
    }

    /// When the debounced candidate becomes due
    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Whether new records go to the side buffer
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Records waiting in the side buffer
    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    /// Switch between live and buffered mode
    ///
    /// Turning buffering off does not flush the buffer; that stays an
    /// explicit [`load_buffered`](Self::load_buffered).
    pub fn set_buffering(&mut self, buffering: bool) {
        self.buffering = buffering;
    }

    /// Validate and deduplicate one live record
    pub fn ingest(&mut self, record: ContentRecord, now: Instant) -> Ingested {
        self.stats.received += 1;

        if let Err(err) = record.validate() {
            self.stats.malformed += 1;
            tracing::warn!(error = %err, "Dropping malformed record");
            return Ingested::Malformed;
        }

        if !self.seen.insert(record.id.clone()) {
            self.stats.duplicates += 1;
            return Ingested::Duplicate;
        }

        if self.buffering {
            self.stats.buffered += 1;
            self.buffer.push(record);
            return Ingested::Buffered(self.buffer.len());
        }

        let mut candidate = self
            .debouncer
            .take_pending()
            .unwrap_or_else(|| self.emitted.clone());
        self.insert_ordered(&mut candidate, record);
        self.debouncer.schedule(candidate, now);
        Ingested::Pending
    }

    /// Emit the debounced candidate if it is due and changed
    pub fn poll(&mut self, now: Instant) -> Option<Vec<ContentRecord>> {
        let items = self.debouncer.fire(now)?;
        Some(self.commit(items))
    }

    /// Move the side buffer to the front of the list and emit immediately
    ///
    /// Returns `None` when the buffer is empty.
    pub fn load_buffered(&mut self) -> Option<Vec<ContentRecord>> {
        if self.buffer.is_empty() {
            return None;
        }

        let base = self
            .debouncer
            .take_pending()
            .unwrap_or_else(|| self.emitted.clone());
        let mut items = std::mem::take(&mut self.buffer);
        items.extend(base);

        self.debouncer.mark_emitted(items.clone());
        Some(self.commit(items))
    }

    /// Merge a fetched page and emit immediately
    ///
    /// Page records go through the same validation and seen-set as live
    /// records, but bypass buffering and debounce.
    pub fn merge_page(&mut self, records: Vec<ContentRecord>) -> PageMerge {
        let mut items = self
            .debouncer
            .take_pending()
            .unwrap_or_else(|| self.emitted.clone());
        let mut added = 0;

        for record in records {
            self.stats.received += 1;

            if let Err(err) = record.validate() {
                self.stats.malformed += 1;
                tracing::warn!(error = %err, "Dropping malformed page record");
                continue;
            }
            if !self.seen.insert(record.id.clone()) {
                self.stats.duplicates += 1;
                continue;
            }

            self.insert_ordered(&mut items, record);
            added += 1;
        }

        self.debouncer.mark_emitted(items.clone());
        PageMerge {
            added,
            items: self.commit(items),
        }
    }

    /// Forget everything: seen ids, items, buffer and pending candidate
    pub fn reset(&mut self) {
        self.seen.clear();
        self.emitted.clear();
        self.buffer.clear();
        self.debouncer.reset();
    }

    /// Drop the pending candidate (teardown)
    pub fn cancel_pending(&mut self) {
        self.debouncer.cancel();
    }

    fn commit(&mut self, items: Vec<ContentRecord>) -> Vec<ContentRecord> {
        self.stats.emissions += 1;
        self.emitted = items.clone();
        items
    }

    fn insert_ordered(&self, items: &mut Vec<ContentRecord>, record: ContentRecord) {
        let ordering = self.ordering;
        let at = items.partition_point(|existing| ordering.compare(existing, &record) == Ordering::Less);
        items.insert(at, record);
    }
}

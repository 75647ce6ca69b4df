//! Bounded page fetch across sources
//!
//! Every source gets the same filter. The fetch ends when each source has
//! sent its end-of-stored marker or closed, when the timeout expires (with
//! whatever arrived), or when the owner cancels. On every exit path the
//! subscriptions are cancelled at their sources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::content::{ContentId, ContentRecord};
use crate::error::{Error, Result};
use crate::source::{ContentSource, SourceEvent, Subscription};

use super::query::PageQuery;

/// Records returned by one page fetch
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Valid records, unique by id, in arrival order
    pub records: Vec<ContentRecord>,
    /// Every queried source finished (marker or closure)
    pub completed: bool,
    /// The timeout cut the fetch short
    pub timed_out: bool,
    /// Sources that refused or failed
    pub failed_sources: usize,
    /// Records dropped by validation
    pub malformed: usize,
}

impl Page {
    /// Unique valid records in the page
    pub fn result_count(&self) -> usize {
        self.records.len()
    }
}

enum PageMessage {
    Event(usize, SourceEvent),
    Closed(usize),
}

/// Fetch one page from every source
pub async fn fetch_page(
    sources: &[Arc<dyn ContentSource>],
    query: &PageQuery,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Page> {
    let deadline = Instant::now() + timeout;
    let scope = cancel.child_token();
    let (tx, mut rx) = mpsc::channel(256);

    let mut page = Page::default();
    let mut last_error: Option<Error> = None;
    let mut finished = vec![false; sources.len()];
    let mut outstanding = 0usize;

    for (idx, source) in sources.iter().enumerate() {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            opened = tokio::time::timeout_at(deadline, source.subscribe(&query.filter)) => opened,
        };

        match opened {
            Ok(Ok(subscription)) => {
                outstanding += 1;
                tokio::spawn(forward(idx, subscription, tx.clone(), scope.clone()));
            }
            Ok(Err(err)) => {
                tracing::warn!(source = source.name(), error = %err, "Page subscription refused");
                finished[idx] = true;
                page.failed_sources += 1;
                last_error = Some(err);
            }
            Err(_) => {
                tracing::warn!(source = source.name(), "Page subscription timed out");
                finished[idx] = true;
                page.failed_sources += 1;
                last_error = Some(Error::Timeout);
            }
        }
    }
    drop(tx);

    if outstanding == 0 {
        return Err(last_error.unwrap_or_else(|| Error::Source("no sources configured".into())));
    }

    let mut seen: HashSet<ContentId> = HashSet::new();

    loop {
        if finished.iter().all(|done| *done) {
            page.completed = true;
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                scope.cancel();
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep_until(deadline) => {
                page.timed_out = true;
                tracing::debug!(received = page.records.len(), "Page query timed out");
                break;
            }
            message = rx.recv() => match message {
                None => {
                    page.completed = true;
                    break;
                }
                Some(PageMessage::Event(_, SourceEvent::Record(record))) => {
                    if let Err(err) = record.validate() {
                        page.malformed += 1;
                        tracing::warn!(error = %err, "Dropping malformed page record");
                    } else if seen.insert(record.id.clone()) {
                        page.records.push(record);
                    }
                }
                Some(PageMessage::Event(idx, SourceEvent::EndOfStoredEvents)) => {
                    finished[idx] = true;
                }
                Some(PageMessage::Event(idx, SourceEvent::Error(message))) => {
                    tracing::warn!(source = sources[idx].name(), error = %message, "Page query failed at source");
                    if !finished[idx] {
                        finished[idx] = true;
                        page.failed_sources += 1;
                    }
                    last_error = Some(Error::TransientNetwork(message));
                }
                Some(PageMessage::Closed(idx)) => {
                    finished[idx] = true;
                }
            }
        }
    }

    scope.cancel();

    if page.failed_sources == sources.len() {
        return Err(last_error.unwrap_or(Error::Timeout));
    }

    Ok(page)
}

async fn forward(
    idx: usize,
    mut subscription: Subscription,
    tx: mpsc::Sender<PageMessage>,
    scope: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            event = subscription.next() => event,
        };

        match event {
            Some(event) => {
                if tx.send(PageMessage::Event(idx, event)).await.is_err() {
                    break;
                }
            }
            None => {
                let _ = tx.send(PageMessage::Closed(idx)).await;
                break;
            }
        }
    }
    // Dropping the subscription cancels it at the source
}

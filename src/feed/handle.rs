//! Feed task and handle
//!
//! Each feed runs as one tokio task that exclusively owns its
//! [`IngestPipeline`] and [`FeedState`]. Everything that changes the feed
//! reaches the task as a message: commands from the [`FeedHandle`], events
//! from live subscription forwarders, and completions of spawned page
//! fetches. Mutation is therefore serialized without locks, and consumers
//! only ever see cloned snapshots published through a `watch` channel.
//!
//! ```text
//!   FeedHandle ──commands──►┐
//!   live forwarders ──────►─┤  FeedTask (pipeline + state) ──watch──► snapshots
//!   page fetch tasks ─────►─┘
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::content::ContentRecord;
use crate::error::{Error, Result};
use crate::paginate::{fetch_page, Cursor, Page, PageCache, PageKind, PageQuery};
use crate::source::{ContentSource, SourceEvent, Subscription};
use crate::stats::IngestStats;

use super::config::FeedConfig;
use super::key::FeedKey;
use super::pipeline::{IngestPipeline, Ingested};
use super::state::{FeedError, FeedState, SubscriptionPhase};

#[derive(Debug)]
enum FeedCommand {
    Start,
    Stop,
    Refresh,
    LoadMore,
    SetBuffering(bool),
    LoadBuffered,
    ClearError,
    Stats(oneshot::Sender<IngestStats>),
}

#[derive(Debug)]
enum LiveMessage {
    Opened {
        epoch: u64,
        opened: usize,
        failures: Vec<String>,
    },
    Event {
        epoch: u64,
        source: usize,
        event: SourceEvent,
    },
    Closed {
        epoch: u64,
        source: usize,
    },
}

#[derive(Debug)]
struct FetchDone {
    epoch: u64,
    query: PageQuery,
    result: Result<Page>,
}

/// Handle to a running feed
///
/// Dropping the handle disposes the feed.
pub struct FeedHandle {
    key: FeedKey,
    commands: mpsc::Sender<FeedCommand>,
    state_rx: watch::Receiver<FeedState>,
    buffered_rx: watch::Receiver<usize>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FeedHandle {
    /// Spawn a feed over the given sources
    pub fn spawn(key: FeedKey, sources: Vec<Arc<dyn ContentSource>>, config: FeedConfig) -> Self {
        Self::spawn_with_cache(key, sources, config, None)
    }

    /// Spawn a feed that memoizes its initial page in `cache`
    pub fn spawn_with_cache(
        key: FeedKey,
        sources: Vec<Arc<dyn ContentSource>>,
        config: FeedConfig,
        cache: Option<PageCache>,
    ) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(FeedState::default());
        let (buffered_tx, buffered_rx) = watch::channel(0);
        let (live_tx, live_rx) = mpsc::channel(capacity);
        let (fetch_tx, fetch_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let mut pipeline = IngestPipeline::new(key.ordering(), config.debounce_window);
        pipeline.set_buffering(config.start_buffered);

        let task = FeedTask {
            key: key.clone(),
            config,
            sources,
            cache,
            pipeline,
            state: FeedState::default(),
            state_tx,
            buffered_tx,
            cancel: cancel.clone(),
            epoch: 0,
            initial_fetch: None,
            older_fetch: None,
            fetch_tx,
            fetch_rx,
            live: LiveSession::default(),
            live_tx,
            live_rx,
        };

        let join = tokio::spawn(task.run(command_rx));

        tracing::debug!(feed = %key, "Feed spawned");

        Self {
            key,
            commands: command_tx,
            state_rx,
            buffered_rx,
            cancel,
            task: Mutex::new(Some(join)),
        }
    }

    /// Feed identity
    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> FeedState {
        self.state_rx.borrow().clone()
    }

    /// Receiver for snapshots
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state_rx.clone()
    }

    /// Records waiting in the side buffer
    pub fn buffered_count(&self) -> usize {
        *self.buffered_rx.borrow()
    }

    /// Receiver for the buffered-count signal
    pub fn watch_buffered(&self) -> watch::Receiver<usize> {
        self.buffered_rx.clone()
    }

    /// Wait until a snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> Result<FeedState>
    where
        F: FnMut(&FeedState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        let state = rx.wait_for(predicate).await.map_err(|_| Error::Disposed)?;
        Ok(state.clone())
    }

    /// Open live subscriptions and load the initial page
    ///
    /// No-op while already subscribing or active.
    pub async fn start(&self) -> Result<()> {
        self.send(FeedCommand::Start).await
    }

    /// Close live subscriptions
    pub async fn stop(&self) -> Result<()> {
        self.send(FeedCommand::Stop).await
    }

    /// Drop cached and loaded items and reload the initial page
    pub async fn refresh(&self) -> Result<()> {
        self.send(FeedCommand::Refresh).await
    }

    /// Fetch the page older than the oldest loaded item
    pub async fn load_more(&self) -> Result<()> {
        self.send(FeedCommand::LoadMore).await
    }

    /// Route new live items to the side buffer (while the user scrolls)
    pub async fn set_buffering(&self, buffering: bool) -> Result<()> {
        self.send(FeedCommand::SetBuffering(buffering)).await
    }

    /// Move buffered items to the front of the feed
    pub async fn load_buffered_videos(&self) -> Result<()> {
        self.send(FeedCommand::LoadBuffered).await
    }

    /// Clear the surfaced error
    pub async fn clear_error(&self) -> Result<()> {
        self.send(FeedCommand::ClearError).await
    }

    /// Ingestion counters
    pub async fn stats(&self) -> Result<IngestStats> {
        let (tx, rx) = oneshot::channel();
        self.send(FeedCommand::Stats(tx)).await?;
        rx.await.map_err(|_| Error::Disposed)
    }

    /// Stop the feed task, cancelling timers, fetches and subscriptions
    ///
    /// Idempotent.
    pub async fn dispose(&self) {
        self.cancel.cancel();

        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            let _ = task.await;
            tracing::debug!(feed = %self.key, "Feed disposed");
        }
    }

    /// Whether the feed was disposed
    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn send(&self, command: FeedCommand) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Disposed);
        }
        self.commands.send(command).await.map_err(|_| Error::Disposed)
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Default)]
struct LiveSession {
    epoch: u64,
    cancel: Option<CancellationToken>,
    opened: Option<usize>,
    down: Vec<usize>,
    errored: bool,
    error_surfaced: bool,
}

struct FeedTask {
    key: FeedKey,
    config: FeedConfig,
    sources: Vec<Arc<dyn ContentSource>>,
    cache: Option<PageCache>,
    pipeline: IngestPipeline,
    state: FeedState,
    state_tx: watch::Sender<FeedState>,
    buffered_tx: watch::Sender<usize>,
    cancel: CancellationToken,

    epoch: u64,
    initial_fetch: Option<CancellationToken>,
    older_fetch: Option<CancellationToken>,
    fetch_tx: mpsc::Sender<FetchDone>,
    fetch_rx: mpsc::Receiver<FetchDone>,

    live: LiveSession,
    live_tx: mpsc::Sender<LiveMessage>,
    live_rx: mpsc::Receiver<LiveMessage>,
}

impl FeedTask {
    async fn run(mut self, mut commands: mpsc::Receiver<FeedCommand>) {
        loop {
            let deadline = self.pipeline.deadline();

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(message) = self.live_rx.recv() => self.on_live(message),
                Some(done) = self.fetch_rx.recv() => self.on_fetch_done(done).await,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_debounce_due();
                }
            }
        }

        self.teardown();
    }

    async fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Start => self.start().await,
            FeedCommand::Stop => {
                if self.state.phase.is_running() {
                    self.close_live(SubscriptionPhase::Stopped);
                    self.publish();
                }
            }
            FeedCommand::Refresh => self.refresh().await,
            FeedCommand::LoadMore => self.load_more(),
            FeedCommand::SetBuffering(buffering) => {
                tracing::debug!(feed = %self.key, buffering, "Buffering toggled");
                self.pipeline.set_buffering(buffering);
            }
            FeedCommand::LoadBuffered => {
                if let Some(items) = self.pipeline.load_buffered() {
                    self.apply_items(items);
                    self.buffered_tx.send_replace(0);
                    self.publish();
                }
            }
            FeedCommand::ClearError => {
                if self.state.error.take().is_some() {
                    self.publish();
                }
            }
            FeedCommand::Stats(reply) => {
                let _ = reply.send(self.pipeline.stats());
            }
        }
    }

    async fn start(&mut self) {
        if !self.state.phase.can_start() {
            tracing::debug!(feed = %self.key, phase = ?self.state.phase, "Start ignored, already running");
            return;
        }

        self.open_live();

        if self.state.items.is_empty() && !self.state.is_loading_initial {
            self.load_initial(true).await;
        }

        self.publish();
    }

    fn open_live(&mut self) {
        let epoch = self.live.epoch + 1;
        let token = self.cancel.child_token();

        self.live = LiveSession {
            epoch,
            cancel: Some(token.clone()),
            ..Default::default()
        };
        self.state.phase = SubscriptionPhase::Subscribing;

        tracing::info!(feed = %self.key, sources = self.sources.len(), "Opening live subscriptions");

        let sources = self.sources.clone();
        let filter = self.key.live_filter();
        let tx = self.live_tx.clone();
        let timeout = self.config.subscribe_timeout;

        tokio::spawn(async move {
            let mut opened = 0;
            let mut failures = Vec::new();

            for (idx, source) in sources.iter().enumerate() {
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    result = tokio::time::timeout(timeout, source.subscribe(&filter)) => result,
                };

                match result {
                    Ok(Ok(subscription)) => {
                        opened += 1;
                        tokio::spawn(forward_live(epoch, idx, subscription, tx.clone(), token.clone()));
                    }
                    Ok(Err(err)) => failures.push(format!("{}: {}", source.name(), err)),
                    Err(_) => failures.push(format!("{}: subscribe timed out", source.name())),
                }
            }

            let _ = tx
                .send(LiveMessage::Opened {
                    epoch,
                    opened,
                    failures,
                })
                .await;
        });
    }

    fn close_live(&mut self, phase: SubscriptionPhase) {
        if let Some(token) = self.live.cancel.take() {
            token.cancel();
        }
        // Stale messages from the closed session are ignored by epoch
        self.live.epoch += 1;
        self.state.phase = phase;

        tracing::info!(feed = %self.key, phase = ?phase, "Live subscriptions closed");
    }

    fn on_live(&mut self, message: LiveMessage) {
        match message {
            LiveMessage::Opened {
                epoch,
                opened,
                failures,
            } if epoch == self.live.epoch => {
                for failure in &failures {
                    tracing::warn!(feed = %self.key, error = %failure, "Live subscription failed");
                }

                if opened == 0 {
                    self.live.errored = true;
                    let err = Error::Source(failures.join("; "));
                    self.surface_live_error(&err);
                    self.close_live(SubscriptionPhase::Error);
                } else {
                    self.live.opened = Some(opened);
                    self.state.phase = SubscriptionPhase::Active;
                    tracing::info!(feed = %self.key, opened, "Live subscriptions active");
                    self.check_live_down();
                }
                self.publish();
            }
            LiveMessage::Event {
                epoch,
                source,
                event,
            } if epoch == self.live.epoch => match event {
                SourceEvent::Record(record) => {
                    if let Ingested::Buffered(count) = self.pipeline.ingest(record, Instant::now()) {
                        self.buffered_tx.send_replace(count);
                    }
                }
                SourceEvent::EndOfStoredEvents => {
                    tracing::trace!(feed = %self.key, source, "Live end of stored events");
                }
                SourceEvent::Error(message) => {
                    tracing::warn!(feed = %self.key, source, error = %message, "Live subscription error");
                    self.live.errored = true;
                    self.surface_live_error(&Error::Source(message));
                    self.mark_live_down(source);
                    self.publish();
                }
            },
            LiveMessage::Closed { epoch, source } if epoch == self.live.epoch => {
                tracing::debug!(feed = %self.key, source, "Live subscription closed by source");
                self.mark_live_down(source);
                self.publish();
            }
            _ => {}
        }
    }

    fn surface_live_error(&mut self, err: &Error) {
        if self.live.error_surfaced {
            return;
        }
        self.live.error_surfaced = true;
        self.state.error = Some(FeedError::from(err));
    }

    fn mark_live_down(&mut self, source: usize) {
        if !self.live.down.contains(&source) {
            self.live.down.push(source);
        }
        self.check_live_down();
    }

    fn check_live_down(&mut self) {
        let Some(opened) = self.live.opened else {
            return;
        };
        if self.live.down.len() >= opened && self.state.phase == SubscriptionPhase::Active {
            let phase = if self.live.errored {
                SubscriptionPhase::Error
            } else {
                SubscriptionPhase::Stopped
            };
            self.close_live(phase);
        }
    }

    async fn load_initial(&mut self, use_cache: bool) {
        if use_cache {
            if let Some(ref cache) = self.cache {
                let hit = cache.lock().await.get(&self.key);

                if let Some((records, has_more)) = hit {
                    tracing::debug!(feed = %self.key, count = records.len(), "Initial page served from cache");
                    let merge = self.pipeline.merge_page(records);
                    self.apply_items(merge.items);
                    self.state.has_more = has_more;
                    self.state.error = None;
                    return;
                }
            }
        }

        let query = PageQuery::initial(&self.key, self.config.page_size);
        self.state.is_loading_initial = true;
        self.initial_fetch = Some(self.spawn_fetch(query));
    }

    fn load_more(&mut self) {
        let oldest = match self.state.oldest_seen_timestamp {
            Some(oldest) if self.state.can_load_more() => oldest,
            _ => {
                tracing::debug!(
                    feed = %self.key,
                    loading = self.state.is_loading_more,
                    has_more = self.state.has_more,
                    "Load more skipped"
                );
                return;
            }
        };

        let query = PageQuery::older(&self.key, Cursor::new(oldest), self.config.page_size);
        tracing::debug!(feed = %self.key, until = oldest - 1, limit = query.limit, "Loading older page");

        self.state.is_loading_more = true;
        self.older_fetch = Some(self.spawn_fetch(query));
        self.publish();
    }

    async fn refresh(&mut self) {
        self.cancel_fetches();
        self.epoch += 1;

        if let Some(ref cache) = self.cache {
            cache.lock().await.invalidate(&self.key);
        }

        self.pipeline.reset();
        self.buffered_tx.send_replace(0);
        self.state.items.clear();
        self.state.oldest_seen_timestamp = None;
        self.state.has_more = true;
        self.state.is_loading_more = false;

        tracing::info!(feed = %self.key, "Refreshing feed");

        self.load_initial(false).await;
        self.publish();
    }

    fn spawn_fetch(&self, query: PageQuery) -> CancellationToken {
        let token = self.cancel.child_token();
        let sources = self.sources.clone();
        let tx = self.fetch_tx.clone();
        let epoch = self.epoch;
        let timeout = self.config.query_timeout;
        let fetch_token = token.clone();

        tokio::spawn(async move {
            let result = fetch_page(&sources, &query, timeout, &fetch_token).await;
            if matches!(result, Err(Error::Cancelled)) {
                return;
            }
            let _ = tx.send(FetchDone { epoch, query, result }).await;
        });

        token
    }

    async fn on_fetch_done(&mut self, done: FetchDone) {
        if done.epoch != self.epoch {
            tracing::trace!(feed = %self.key, "Discarding stale page result");
            return;
        }

        let FetchDone { query, result, .. } = done;

        match query.kind {
            PageKind::Initial => {
                self.initial_fetch = None;
                self.state.is_loading_initial = false;
            }
            PageKind::Older(_) => {
                self.older_fetch = None;
                self.state.is_loading_more = false;
            }
        }

        match result {
            Ok(page) => {
                let count = page.result_count();
                let has_more = query.has_more_after(count);

                if query.kind == PageKind::Initial {
                    if let Some(ref cache) = self.cache {
                        cache
                            .lock()
                            .await
                            .put(self.key.clone(), page.records.clone(), has_more);
                    }
                }

                let merge = self.pipeline.merge_page(page.records);
                self.apply_items(merge.items);
                self.state.has_more = has_more;
                self.state.error = None;

                tracing::info!(
                    feed = %self.key,
                    continuation = query.is_continuation(),
                    count,
                    added = merge.added,
                    has_more,
                    timed_out = page.timed_out,
                    "Page loaded"
                );
            }
            Err(err) => {
                tracing::warn!(
                    feed = %self.key,
                    continuation = query.is_continuation(),
                    error = %err,
                    "Page load failed"
                );
                self.state.error = Some(FeedError::from(&err));
            }
        }

        self.publish();
    }

    fn on_debounce_due(&mut self) {
        if let Some(items) = self.pipeline.poll(Instant::now()) {
            self.apply_items(items);
            self.publish();
        }
    }

    fn apply_items(&mut self, items: Vec<ContentRecord>) {
        self.state.items = items;
        self.state.oldest_seen_timestamp = self.pipeline.oldest_timestamp();
    }

    fn publish(&mut self) {
        self.state.generation += 1;
        self.state_tx.send_replace(self.state.clone());
    }

    fn cancel_fetches(&mut self) {
        for token in [self.initial_fetch.take(), self.older_fetch.take()]
            .into_iter()
            .flatten()
        {
            token.cancel();
        }
        self.state.is_loading_initial = false;
    }

    fn teardown(&mut self) {
        if let Some(token) = self.live.cancel.take() {
            token.cancel();
        }
        self.cancel_fetches();
        self.pipeline.cancel_pending();
        tracing::debug!(feed = %self.key, "Feed task stopped");
    }
}

async fn forward_live(
    epoch: u64,
    source: usize,
    mut subscription: Subscription,
    tx: mpsc::Sender<LiveMessage>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            event = subscription.next() => event,
        };

        let message = match event {
            Some(event) => LiveMessage::Event {
                epoch,
                source,
                event,
            },
            None => {
                let _ = tx.send(LiveMessage::Closed { epoch, source }).await;
                return;
            }
        };

        if tx.send(message).await.is_err() {
            return;
        }
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("key", &self.key)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::{self, CacheConfig};
    use crate::error::ErrorKind;
    use crate::source::MemorySource;

    const WAIT: Duration = Duration::from_secs(5);

    fn rec(id: &str, t: i64) -> ContentRecord {
        ContentRecord::new(id, "alice", t, format!("https://cdn/{}.mp4", id))
    }

    fn config() -> FeedConfig {
        FeedConfig::default().debounce_window(Duration::from_millis(20))
    }

    fn spawn(key: FeedKey, source: &Arc<MemorySource>, config: FeedConfig) -> FeedHandle {
        FeedHandle::spawn(key, vec![source.clone() as Arc<dyn ContentSource>], config)
    }

    async fn wait<F>(feed: &FeedHandle, predicate: F) -> FeedState
    where
        F: FnMut(&FeedState) -> bool,
    {
        tokio::time::timeout(WAIT, feed.wait_for(predicate))
            .await
            .expect("feed did not reach expected state")
            .expect("feed disposed")
    }

    fn ids(state: &FeedState) -> Vec<&str> {
        state.items.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_live_duplicates_coalesced() {
        let source = Arc::new(MemorySource::new("relay"));
        let feed = spawn(FeedKey::Discovery, &source, config());

        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active && !s.is_loading_initial).await;

        source.publish(rec("A", 100));
        source.publish(rec("B", 200));
        source.publish(rec("A", 100));

        let state = wait(&feed, |s| s.len() == 2).await;
        assert_eq!(ids(&state), vec!["B", "A"]);

        let stats = feed.stats().await.unwrap();
        assert_eq!(stats.duplicates, 1);
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_load_more_scenario() {
        let mut records: Vec<ContentRecord> =
            (500..550).map(|t| rec(&format!("new{}", t), t)).collect();
        records.extend((400..460).map(|t| rec(&format!("old{}", t), t)));
        let source = Arc::new(MemorySource::with_records("relay", records));
        let feed = spawn(FeedKey::profile("alice"), &source, config().page_size(50));

        feed.start().await.unwrap();
        let state = wait(&feed, |s| s.len() == 50 && !s.is_loading_initial).await;
        assert_eq!(state.oldest_seen_timestamp, Some(500));
        assert!(state.has_more);

        feed.load_more().await.unwrap();
        let state = wait(&feed, |s| s.len() == 100 && !s.is_loading_more).await;

        assert!(state.has_more);
        assert_eq!(state.oldest_seen_timestamp, Some(410));
        assert!(state.items[50..].iter().all(|r| r.created_at < 500));
        assert!(state.error.is_none());
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_load_more_error_keeps_items() {
        let source = Arc::new(MemorySource::with_records(
            "relay",
            (1..=10).map(|t| rec(&format!("r{}", t), t * 100)).collect(),
        ));
        let feed = spawn(FeedKey::Discovery, &source, config().page_size(10));

        feed.start().await.unwrap();
        wait(&feed, |s| s.len() == 10 && s.phase == SubscriptionPhase::Active).await;

        source.refuse_subscriptions(true);
        feed.load_more().await.unwrap();

        let state = wait(&feed, |s| s.error.is_some() && !s.is_loading_more).await;
        assert_eq!(state.len(), 10);
        assert!(state.has_more);
        assert!(!state.needs_retry_action());

        feed.clear_error().await.unwrap();
        wait(&feed, |s| s.error.is_none()).await;
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let source = Arc::new(MemorySource::with_records("relay", vec![rec("a", 1)]));
        let feed = spawn(FeedKey::Discovery, &source, config());

        feed.start().await.unwrap();
        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active && s.len() == 1).await;
        feed.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // one live subscription + one initial page query
        assert_eq!(source.subscribe_calls(), 2);
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_initial_page_served_from_cache() {
        let source = Arc::new(MemorySource::with_records("relay", vec![rec("a", 1), rec("b", 2)]));
        let page_cache: PageCache = cache::shared(CacheConfig::default());
        let sources = vec![source.clone() as Arc<dyn ContentSource>];

        let first = FeedHandle::spawn_with_cache(
            FeedKey::Discovery,
            sources.clone(),
            config(),
            Some(page_cache.clone()),
        );
        first.start().await.unwrap();
        wait(&first, |s| s.len() == 2 && s.phase == SubscriptionPhase::Active).await;
        assert_eq!(source.subscribe_calls(), 2);

        let second =
            FeedHandle::spawn_with_cache(FeedKey::Discovery, sources, config(), Some(page_cache));
        second.start().await.unwrap();
        let state = wait(&second, |s| s.len() == 2 && s.phase == SubscriptionPhase::Active).await;

        assert!(!state.has_more);
        // only the live subscription hit the network
        assert_eq!(source.subscribe_calls(), 3);

        first.dispose().await;
        second.dispose().await;
    }

    #[tokio::test]
    async fn test_live_error_surfaced_once_and_items_kept() {
        let source = Arc::new(MemorySource::with_records("relay", vec![rec("a", 1)]));
        let feed = spawn(FeedKey::Discovery, &source, config());

        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active && s.len() == 1).await;

        source.fail_live("relay hiccup");
        let state = wait(&feed, |s| s.error.is_some()).await;
        assert_eq!(state.len(), 1);
        assert_eq!(state.error.as_ref().map(|e| e.kind), Some(ErrorKind::Source));

        feed.clear_error().await.unwrap();
        wait(&feed, |s| s.error.is_none()).await;

        source.fail_live("again");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(feed.snapshot().error.is_none());
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_buffered_items_flushed_to_front() {
        let source = Arc::new(MemorySource::with_records("relay", vec![rec("old", 10)]));
        let feed = spawn(FeedKey::Discovery, &source, config());

        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active && s.len() == 1).await;

        feed.set_buffering(true).await.unwrap();
        source.publish(rec("fresh", 5));

        let mut buffered = feed.watch_buffered();
        tokio::time::timeout(WAIT, buffered.wait_for(|n| *n == 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids(&feed.snapshot()), vec!["old"]);

        feed.load_buffered_videos().await.unwrap();
        let state = wait(&feed, |s| s.len() == 2).await;
        assert_eq!(ids(&state), vec!["fresh", "old"]);
        assert_eq!(feed.buffered_count(), 0);
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_all_sources_refusing() {
        let source = Arc::new(MemorySource::new("relay"));
        source.refuse_subscriptions(true);
        let feed = spawn(FeedKey::Discovery, &source, config());

        feed.start().await.unwrap();
        let state = wait(&feed, |s| {
            s.phase == SubscriptionPhase::Error && !s.is_loading_initial && s.error.is_some()
        })
        .await;

        assert!(state.needs_retry_action());
        assert!(state.error.as_ref().unwrap().kind.is_retryable());

        // Error phase may be restarted once the relay recovers
        source.refuse_subscriptions(false);
        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active).await;
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_refresh_reloads_from_network() {
        let source = Arc::new(MemorySource::with_records("relay", vec![rec("a", 1)]));
        let page_cache: PageCache = cache::shared(CacheConfig::default());
        let feed = FeedHandle::spawn_with_cache(
            FeedKey::Discovery,
            vec![source.clone() as Arc<dyn ContentSource>],
            config(),
            Some(page_cache.clone()),
        );

        feed.start().await.unwrap();
        wait(&feed, |s| s.len() == 1).await;

        source.store(vec![rec("b", 2)]);
        feed.refresh().await.unwrap();
        let state = wait(&feed, |s| s.len() == 2).await;
        assert_eq!(ids(&state), vec!["b", "a"]);

        let cached = page_cache.lock().await.get(&FeedKey::Discovery);
        assert_eq!(cached.map(|(records, _)| records.len()), Some(2));
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_closes_sources() {
        let source = Arc::new(MemorySource::new("relay"));
        let feed = spawn(FeedKey::Discovery, &source, config());

        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active).await;

        feed.dispose().await;
        feed.dispose().await;
        assert!(feed.is_disposed());
        assert!(matches!(feed.load_more().await, Err(Error::Disposed)));

        for _ in 0..50 {
            if source.active_subscriptions() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(source.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_generation_is_monotonic() {
        let source = Arc::new(MemorySource::new("relay"));
        let feed = spawn(FeedKey::Discovery, &source, config());
        let mut rx = feed.subscribe();

        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active).await;
        for i in 0..5 {
            source.publish(rec(&format!("r{}", i), i));
        }
        wait(&feed, |s| s.len() == 5).await;

        let mut last = 0;
        while rx.has_changed().unwrap_or(false) {
            let generation = rx.borrow_and_update().generation;
            assert!(generation > last);
            last = generation;
        }
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_zero_channel_capacity_is_clamped() {
        let source = Arc::new(MemorySource::new("relay"));
        let config = FeedConfig {
            channel_capacity: 0,
            ..config()
        };
        let feed = spawn(FeedKey::Discovery, &source, config);

        feed.start().await.unwrap();
        wait(&feed, |s| s.phase == SubscriptionPhase::Active).await;
        source.publish(rec("a", 1));
        source.publish(rec("b", 2));
        let state = wait(&feed, |s| s.len() == 2).await;
        assert_eq!(state.items[0].id.as_str(), "b");
        feed.dispose().await;
    }

    #[tokio::test]
    async fn test_raw_event_survives_dedup_paging_and_cache() {
        let body = |id: &str| bytes::Bytes::from(format!("evt-{}", id));
        let tagged = |id: &str, t: i64| rec(id, t).with_raw(body(id));
        let source = Arc::new(MemorySource::with_records(
            "relay",
            vec![tagged("r1", 100), tagged("r2", 200), tagged("r3", 300)],
        ));
        let page_cache: PageCache = cache::shared(CacheConfig::default());
        let sources = vec![source.clone() as Arc<dyn ContentSource>];
        let open = |cache: PageCache| {
            FeedHandle::spawn_with_cache(
                FeedKey::Discovery,
                sources.clone(),
                config().page_size(2),
                Some(cache),
            )
        };

        let feed = open(page_cache.clone());
        feed.start().await.unwrap();
        wait(&feed, |s| s.len() == 2 && s.phase == SubscriptionPhase::Active).await;
        feed.load_more().await.unwrap();
        wait(&feed, |s| s.len() == 3 && !s.is_loading_more).await;

        // a later copy of r3 with a different body must not replace the first
        source.publish(rec("r3", 300).with_raw(bytes::Bytes::from_static(b"dup")));
        source.publish(tagged("r4", 400));
        let state = wait(&feed, |s| s.len() == 4).await;
        for item in &state.items {
            assert_eq!(item.raw, body(item.id.as_str()));
        }
        feed.dispose().await;

        let cached = open(page_cache);
        cached.start().await.unwrap();
        let state = wait(&cached, |s| s.len() == 2).await;
        let ids: Vec<&str> = state.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r3", "r2"]);
        for item in &state.items {
            assert_eq!(item.raw, body(item.id.as_str()));
        }
        cached.dispose().await;
    }
}

//! Resource pool implementation
//!
//! The pool owns every handle and every underlying resource. Mutation goes
//! through one `RwLock`; construction tasks run outside the lock and only
//! store their result after re-acquiring it and checking that the entry they
//! were spawned for (same generation, not cancelled) is still there.
//! Resources are always disposed after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::content::ContentId;
use crate::error::{Error, Result};
use crate::stats::PoolStats;

use super::config::PoolConfig;
use super::construct::{self, Dispatch};
use super::engine::{ArtifactStore, PlaybackEngine, PlaybackResource, ResourceError};
use super::handle::{PoolEntry, Priority, ResourceHandle, ResourceState};

/// Pool notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// Resource constructed
    Ready(ContentId),
    /// Construction gave up
    Failed(ContentId, ResourceError),
    /// Removed by maintenance or memory pressure
    Evicted(ContentId),
    /// Removed by `release` or shutdown
    Released(ContentId),
}

#[derive(Default)]
struct PoolInner {
    entries: HashMap<ContentId, PoolEntry>,
    active: Option<ContentId>,
    closed: bool,
}

impl PoolInner {
    fn live_count(&self) -> usize {
        self.entries.values().filter(|e| e.state.is_live()).count()
    }
}

/// Bounded pool of playback resources
///
/// One pool exists per playback surface.
pub struct ResourcePool {
    inner: RwLock<PoolInner>,
    engine: Arc<dyn PlaybackEngine>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    config: PoolConfig,
    events: broadcast::Sender<PoolEvent>,
    next_generation: AtomicU64,
    total_failures: AtomicU64,
    total_evictions: AtomicU64,
    shutdown: CancellationToken,
}

impl ResourcePool {
    /// Create a pool with default configuration
    pub fn new(engine: Arc<dyn PlaybackEngine>) -> Self {
        Self::with_config(engine, PoolConfig::default())
    }

    /// Create a pool with custom configuration
    pub fn with_config(engine: Arc<dyn PlaybackEngine>, config: PoolConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: RwLock::new(PoolInner::default()),
            engine,
            artifacts: None,
            config,
            events,
            next_generation: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_evictions: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach the durable artifact cache used for corruption recovery
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Request a resource for `content_id`
    ///
    /// Returns the existing handle if there is one, whatever its state,
    /// after touching it and adopting `priority`. Otherwise admits a new
    /// handle, sweeping first when the pool is at capacity, and starts
    /// construction in the background.
    pub async fn request(
        self: &Arc<Self>,
        content_id: ContentId,
        locator: impl Into<String>,
        priority: Priority,
    ) -> Result<ResourceHandle> {
        let (handle, locator, generation, cancel, evicted) = {
            let mut inner = self.inner.write().await;

            if inner.closed {
                return Err(Error::Disposed);
            }

            if let Some(entry) = inner.entries.get_mut(&content_id) {
                entry.touch();
                entry.priority = priority;
                tracing::trace!(content_id = %content_id, state = ?entry.state, "Existing handle reused");
                return Ok(entry.snapshot());
            }

            let mut evicted = Vec::new();
            if inner.live_count() >= self.config.max_resources {
                evicted = self.sweep(&mut inner);

                let live = inner.live_count();
                if live >= self.config.max_resources {
                    tracing::warn!(
                        content_id = %content_id,
                        error = %Error::CapacityExceeded { live, max: self.config.max_resources },
                        "Admitting over budget, remaining handles are protected"
                    );
                }
            }

            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let cancel = self.shutdown.child_token();
            let mut entry = PoolEntry::new(
                content_id.clone(),
                locator.into(),
                priority,
                generation,
                cancel.clone(),
            );
            entry.transition(ResourceState::Initializing);

            let handle = entry.snapshot();
            let locator = entry.locator.clone();
            inner.entries.insert(content_id.clone(), entry);

            (handle, locator, generation, cancel, evicted)
        };

        self.dispose_evicted(evicted).await;

        tracing::info!(
            content_id = %content_id,
            priority = ?priority,
            generation,
            "Resource requested"
        );

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.construct(content_id, locator, generation, cancel).await;
        });

        Ok(handle)
    }

    /// Dispose the resource for `content_id` and remove its handle
    ///
    /// Returns false if there was no handle. Idempotent.
    pub async fn release(&self, content_id: &ContentId) -> bool {
        let entry = self.inner.write().await.entries.remove(content_id);

        let Some(mut entry) = entry else {
            return false;
        };

        entry.cancel.cancel();
        entry.transition(ResourceState::Released);
        if let Some(mut resource) = entry.resource.take() {
            resource.dispose().await;
        }

        tracing::info!(content_id = %content_id, "Resource released");
        let _ = self.events.send(PoolEvent::Released(content_id.clone()));
        true
    }

    /// Name the currently-active content; maintenance never evicts it
    pub async fn set_active(&self, content_id: Option<ContentId>) {
        let mut inner = self.inner.write().await;

        if let Some(ref id) = content_id {
            if let Some(entry) = inner.entries.get_mut(id) {
                entry.touch();
            }
        }

        tracing::debug!(active = ?content_id, "Active content changed");
        inner.active = content_id;
    }

    /// Currently-active content
    pub async fn active(&self) -> Option<ContentId> {
        self.inner.read().await.active.clone()
    }

    /// Run one maintenance sweep
    ///
    /// Drops failed handles untouched for longer than the retention, then
    /// sweeps down to the eviction floor if the live count exceeds the
    /// ceiling. A pool sitting exactly at the ceiling is left alone.
    /// Returns the number of handles removed.
    pub async fn maintenance(&self) -> usize {
        let (stale, evicted) = {
            let mut inner = self.inner.write().await;
            if inner.closed {
                return 0;
            }
            let stale = self.prune_failed(&mut inner);
            let evicted = if inner.live_count() > self.config.max_resources {
                self.sweep(&mut inner)
            } else {
                Vec::new()
            };
            (stale, evicted)
        };

        let pruned = stale.len();
        for entry in stale {
            tracing::debug!(content_id = %entry.content_id, "Stale failed handle dropped");
            let _ = self.events.send(PoolEvent::Released(entry.content_id));
        }

        let count = evicted.len();
        self.dispose_evicted(evicted).await;

        if count + pruned > 0 {
            tracing::info!(evicted = count, pruned, "Pool maintenance complete");
        }
        count + pruned
    }

    /// Release everything except `keep`, ignoring the eviction floor
    pub async fn on_memory_pressure(&self, keep: Option<&ContentId>) -> usize {
        let evicted: Vec<PoolEntry> = {
            let mut inner = self.inner.write().await;
            let ids: Vec<ContentId> = inner
                .entries
                .keys()
                .filter(|id| Some(*id) != keep)
                .cloned()
                .collect();
            ids.iter().filter_map(|id| inner.entries.remove(id)).collect()
        };

        for entry in &evicted {
            entry.cancel.cancel();
        }

        let count = evicted.len();
        tracing::warn!(released = count, keep = ?keep, "Memory pressure, releasing resources");
        self.dispose_evicted(evicted).await;
        count
    }

    /// Run `f` against the resource for `content_id` if it is ready
    pub async fn with_resource<F, R>(&self, content_id: &ContentId, f: F) -> Option<R>
    where
        F: FnOnce(&dyn PlaybackResource) -> R,
    {
        let mut inner = self.inner.write().await;
        let entry = inner.entries.get_mut(content_id)?;

        if entry.state != ResourceState::Ready {
            return None;
        }
        entry.touch();
        entry.resource.as_deref().map(|resource| f(resource))
    }

    /// Snapshot of one handle
    pub async fn get(&self, content_id: &ContentId) -> Option<ResourceHandle> {
        self.inner
            .read()
            .await
            .entries
            .get(content_id)
            .map(|e| e.snapshot())
    }

    /// Snapshots of every handle
    pub async fn handles(&self) -> Vec<ResourceHandle> {
        self.inner
            .read()
            .await
            .entries
            .values()
            .map(|e| e.snapshot())
            .collect()
    }

    /// Pool statistics
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.read().await;
        let mut stats = PoolStats {
            max_resources: self.config.max_resources,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
            ..Default::default()
        };

        for entry in inner.entries.values() {
            match entry.state {
                ResourceState::Requested => stats.requested += 1,
                ResourceState::Initializing => stats.initializing += 1,
                ResourceState::Ready => {
                    stats.ready += 1;
                    stats.estimated_bytes += entry.estimated_bytes();
                }
                ResourceState::Failed => stats.failed += 1,
                ResourceState::Released => {}
            }
        }

        stats
    }

    /// Receiver for pool events
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Spawn the periodic maintenance task
    ///
    /// The task ends when the pool shuts down.
    pub fn spawn_maintenance_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let interval = pool.config.maintenance_interval;
        let shutdown = pool.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        pool.maintenance().await;
                    }
                }
            }
        })
    }

    /// Cancel constructions and dispose every resource
    ///
    /// Idempotent. Later requests fail with [`Error::Disposed`].
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let entries: Vec<PoolEntry> = {
            let mut inner = self.inner.write().await;
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.active = None;
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = entries.len();
        for mut entry in entries {
            entry.transition(ResourceState::Released);
            if let Some(mut resource) = entry.resource.take() {
                resource.dispose().await;
            }
            let _ = self.events.send(PoolEvent::Released(entry.content_id));
        }

        tracing::info!(released = count, "Resource pool shut down");
    }

    /// Whether the pool was shut down
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Remove lowest-priority, least-recently-used live handles until the
    /// live count reaches the eviction floor. The active content is skipped.
    fn sweep(&self, inner: &mut PoolInner) -> Vec<PoolEntry> {
        let floor = self.config.eviction_floor();
        let mut live = inner.live_count();

        let mut candidates: Vec<_> = inner
            .entries
            .values()
            .filter(|e| e.state.is_live() && inner.active.as_ref() != Some(&e.content_id))
            .map(|e| (e.priority, e.last_accessed_at, e.content_id.clone()))
            .collect();
        candidates.sort();

        let mut evicted = Vec::new();
        for (_, _, id) in candidates {
            if live <= floor {
                break;
            }
            if let Some(entry) = inner.entries.remove(&id) {
                entry.cancel.cancel();
                evicted.push(entry);
                live -= 1;
            }
        }

        evicted
    }

    /// Remove failed handles not requested within the retention window.
    /// The active content is kept so the UI can keep showing it.
    fn prune_failed(&self, inner: &mut PoolInner) -> Vec<PoolEntry> {
        let retention = self.config.failed_retention;
        let stale: Vec<ContentId> = inner
            .entries
            .values()
            .filter(|e| {
                e.state == ResourceState::Failed
                    && e.last_accessed_at.elapsed() >= retention
                    && inner.active.as_ref() != Some(&e.content_id)
            })
            .map(|e| e.content_id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| inner.entries.remove(id))
            .map(|mut entry| {
                entry.transition(ResourceState::Released);
                entry
            })
            .collect()
    }

    async fn dispose_evicted(&self, evicted: Vec<PoolEntry>) {
        for mut entry in evicted {
            entry.transition(ResourceState::Released);
            if let Some(mut resource) = entry.resource.take() {
                resource.dispose().await;
            }

            self.total_evictions.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                content_id = %entry.content_id,
                priority = ?entry.priority,
                "Resource evicted"
            );
            let _ = self.events.send(PoolEvent::Evicted(entry.content_id));
        }
    }

    async fn construct(
        self: Arc<Self>,
        content_id: ContentId,
        locator: String,
        generation: u64,
        cancel: CancellationToken,
    ) {
        loop {
            let dispatch = construct::dispatch(
                self.engine.as_ref(),
                &content_id,
                &locator,
                &self.config,
                &cancel,
            )
            .await;

            match dispatch {
                Dispatch::Cancelled => {
                    tracing::debug!(content_id = %content_id, "Construction cancelled");
                    return;
                }
                Dispatch::Ready { resource, attempts } => {
                    self.complete_ready(&content_id, generation, resource, attempts)
                        .await;
                    return;
                }
                Dispatch::Failed { error, attempts } => {
                    let corrupted = error.is_corrupted_artifact();
                    let redispatch = self
                        .complete_failed(&content_id, generation, error, attempts)
                        .await;

                    if corrupted {
                        if let Some(ref store) = self.artifacts {
                            let removed = store.remove(&locator).await;
                            tracing::info!(
                                content_id = %content_id,
                                locator = %locator,
                                removed,
                                "Removed corrupted artifact"
                            );
                        }
                    }

                    if !redispatch || !self.redispatch(&content_id, generation).await {
                        return;
                    }
                }
            }
        }
    }

    async fn complete_ready(
        &self,
        content_id: &ContentId,
        generation: u64,
        resource: Box<dyn PlaybackResource>,
        attempts: u32,
    ) {
        let stale = {
            let mut inner = self.inner.write().await;
            match inner.entries.get_mut(content_id) {
                Some(entry)
                    if entry.generation == generation
                        && !entry.cancel.is_cancelled()
                        && entry.state == ResourceState::Initializing =>
                {
                    entry.transition(ResourceState::Ready);
                    entry.attempts = attempts;
                    entry.last_error = None;
                    entry.resource = Some(resource);
                    None
                }
                _ => Some(resource),
            }
        };

        if let Some(mut resource) = stale {
            resource.dispose().await;
            tracing::debug!(content_id = %content_id, "Discarded resource for a removed handle");
            return;
        }

        tracing::info!(content_id = %content_id, attempts, "Resource ready");
        let _ = self.events.send(PoolEvent::Ready(content_id.clone()));
    }

    /// Mark the entry failed; returns whether a corrupted-artifact
    /// re-dispatch is allowed
    async fn complete_failed(
        &self,
        content_id: &ContentId,
        generation: u64,
        error: ResourceError,
        attempts: u32,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.entries.get_mut(content_id) else {
            return false;
        };
        if entry.generation != generation || entry.cancel.is_cancelled() {
            return false;
        }

        entry.transition(ResourceState::Failed);
        entry.attempts = attempts;
        entry.last_error = Some(error.clone());
        let redispatch = error.is_corrupted_artifact()
            && entry.self_invalidations < self.config.max_self_invalidations;
        drop(inner);

        self.total_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            content_id = %content_id,
            attempts,
            error = %error,
            "Resource construction failed"
        );
        let _ = self.events.send(PoolEvent::Failed(content_id.clone(), error));

        redispatch
    }

    async fn redispatch(&self, content_id: &ContentId, generation: u64) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.entries.get_mut(content_id) else {
            return false;
        };
        if entry.generation != generation
            || entry.cancel.is_cancelled()
            || entry.state != ResourceState::Failed
        {
            return false;
        }

        entry.self_invalidations += 1;
        entry.attempts = 0;
        entry.transition(ResourceState::Initializing);

        tracing::info!(
            content_id = %content_id,
            self_invalidations = entry.self_invalidations,
            "Re-dispatching construction after artifact removal"
        );
        true
    }
}

impl Drop for ResourcePool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

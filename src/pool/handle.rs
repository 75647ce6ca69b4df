//! Resource handles and their lifecycle
//!
//! This module defines the per-content state stored in the pool.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::content::ContentId;
use crate::error::Error;

use super::engine::{PlaybackResource, ResourceError};

/// Lifecycle of a pooled resource
///
/// `Requested → Initializing → {Ready, Failed}`, `Ready → Released`,
/// `Failed → Initializing` (corrupted artifact re-dispatch) or
/// `Failed → Released`. Nothing leaves `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Admitted, construction not yet dispatched
    Requested,
    /// Construction in flight
    Initializing,
    /// Resource constructed and playable
    Ready,
    /// Construction gave up
    Failed,
    /// Disposed and removed from the pool
    Released,
}

impl ResourceState {
    /// Whether the handle counts against the pool ceiling
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ResourceState::Requested | ResourceState::Initializing | ResourceState::Ready
        )
    }

    pub(crate) fn can_transition_to(self, next: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, next),
            (Requested, Initializing)
                | (Initializing, Ready)
                | (Initializing, Failed)
                | (Failed, Initializing)
                | (Requested, Released)
                | (Initializing, Released)
                | (Ready, Released)
                | (Failed, Released)
        )
    }
}

/// How urgently a resource is needed
///
/// Ordered so that sweeps evict the smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Prefetched, far from the viewport
    Background,
    /// Adjacent to the visible item
    Nearby,
    /// On screen
    Current,
}

/// Snapshot of a pooled resource
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    /// Content the resource plays
    pub content_id: ContentId,
    /// Media locator
    pub locator: String,
    /// Lifecycle state at snapshot time
    pub state: ResourceState,
    /// Latest requested priority
    pub priority: Priority,
    /// When the handle was admitted
    pub created_at: Instant,
    /// Last request or access
    pub last_accessed_at: Instant,
    /// Construction attempts in the current dispatch
    pub attempts: u32,
    /// Corrupted-artifact re-dispatches so far
    pub self_invalidations: u32,
    /// Last construction error
    pub last_error: Option<ResourceError>,
}

impl ResourceHandle {
    /// Whether the resource can be played
    pub fn is_ready(&self) -> bool {
        self.state == ResourceState::Ready
    }

    /// Whether the UI should show the content as unavailable
    pub fn is_unavailable(&self) -> bool {
        self.state == ResourceState::Failed
    }

    /// Crate error for a failed handle
    pub fn error(&self) -> Option<Error> {
        if self.state != ResourceState::Failed {
            return None;
        }
        let err = self.last_error.clone()?;
        if err.is_corrupted_artifact() {
            Some(Error::CorruptedArtifact(self.locator.clone()))
        } else {
            Some(Error::ResourceConstruction(self.content_id.clone(), err))
        }
    }
}

/// Pool-owned entry for one content id
pub(crate) struct PoolEntry {
    pub content_id: ContentId,
    pub locator: String,
    pub state: ResourceState,
    pub priority: Priority,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub attempts: u32,
    pub self_invalidations: u32,
    pub last_error: Option<ResourceError>,
    pub resource: Option<Box<dyn PlaybackResource>>,
    /// Distinguishes this entry from a later one for the same id
    pub generation: u64,
    /// Cancels the construction task of this entry
    pub cancel: CancellationToken,
}

impl PoolEntry {
    pub fn new(
        content_id: ContentId,
        locator: String,
        priority: Priority,
        generation: u64,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            content_id,
            locator,
            state: ResourceState::Requested,
            priority,
            created_at: now,
            last_accessed_at: now,
            attempts: 0,
            self_invalidations: 0,
            last_error: None,
            resource: None,
            generation,
            cancel,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Instant::now();
    }

    /// Apply a transition; returns false (and leaves state alone) if illegal
    pub fn transition(&mut self, next: ResourceState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                content_id = %self.content_id,
                from = ?self.state,
                to = ?next,
                "Illegal resource transition ignored"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn snapshot(&self) -> ResourceHandle {
        ResourceHandle {
            content_id: self.content_id.clone(),
            locator: self.locator.clone(),
            state: self.state,
            priority: self.priority,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            attempts: self.attempts,
            self_invalidations: self.self_invalidations,
            last_error: self.last_error.clone(),
        }
    }

    pub fn estimated_bytes(&self) -> usize {
        self.resource.as_ref().map_or(0, |r| r.estimated_bytes())
    }
}

//! Bounded playback resource pool
//!
//! Playback resources (decoders, players) are expensive, so only a few may
//! exist at once. The pool hands out one handle per content id, builds the
//! resource in the background with bounded retries, and evicts the least
//! useful handles when it fills up.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<ResourcePool>
//!               ┌──────────────────────────────┐
//!               │ entries: HashMap<ContentId,  │
//!               │   PoolEntry {                │
//!               │     state, priority,         │
//!               │     resource, generation,    │
//!               │   }                          │
//!               │ >                            │
//!               └──────┬─────────────┬─────────┘
//!                      │             │
//!   request() ──► admission sweep    construction task
//!                 (live ≥ max:       dispatch() ─► engine.create()
//!                  evict to 70%)                ─► initialize() (30s / 60s)
//!                      │                        ─► retry transient ×3, 500ms
//!                      ▼                        ─► corrupted? remove artifact,
//!                 PoolEvent::Evicted               re-dispatch once
//! ```
//!
//! Eviction order is `Background < Nearby < Current`, least recently
//! accessed first. The active content is never swept; memory pressure
//! releases everything except one handle the caller names.

mod construct;
pub mod config;
pub mod engine;
pub mod handle;
pub mod store;

pub use config::{PoolConfig, DEFAULT_EVICTION_TARGET, DEFAULT_MAX_RESOURCES};
pub use engine::{ArtifactStore, PlaybackEngine, PlaybackResource, ResourceError, ResourceErrorKind};
pub use handle::{Priority, ResourceHandle, ResourceState};
pub use store::{PoolEvent, ResourcePool};

//! loopfeed: client-side feed and playback resource layer
//!
//! Aggregates short-form video content from several relay-style sources
//! into ordered, duplicate-free feeds, pages backward through history, and
//! keeps a bounded pool of heavyweight playback resources for the items
//! on or near the screen.
//!
//! ```text
//!   ContentSource ×N ──► FeedHandle / FeedTask ──► FeedState snapshots
//!                          │   ▲
//!              PageCache ◄─┘   └── fetch_page (cursor, 30s)
//!
//!   visible items ──► ResourcePool ──► PlaybackEngine
//! ```
//!
//! # Modules
//!
//! - [`cache`]: TTL keyed cache, one instance per entity kind
//! - [`feed`]: feed task, ingestion pipeline, snapshots
//! - [`paginate`]: cursor queries and bounded multi-source page fetch
//! - [`pool`]: bounded playback resource pool
//! - [`source`]: the content source capability and an in-memory source
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod cache;
pub mod content;
pub mod debounce;
pub mod error;
pub mod feed;
pub mod paginate;
pub mod pool;
pub mod source;
pub mod stats;

pub use cache::{CacheConfig, TtlCache};
pub use content::{ContentId, ContentRecord, FeedOrdering, OwnerId};
pub use error::{Error, ErrorKind, Result};
pub use feed::{FeedConfig, FeedHandle, FeedKey, FeedState};
pub use paginate::PageCache;
pub use pool::{PoolConfig, Priority, ResourcePool};
pub use source::{ContentSource, MemorySource};

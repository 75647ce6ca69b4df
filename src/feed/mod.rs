//! Live feeds
//!
//! A feed merges records from several sources into one ordered,
//! duplicate-free list. Live records are coalesced by a debounce window so
//! that a burst of arrivals produces one update; older history is pulled in
//! pages with a timestamp cursor.
//!
//! # Architecture
//!
//! ```text
//!                 FeedHandle (cheap, owned by the UI layer)
//!                      │ commands            ▲ watch<FeedState>
//!                      ▼                     │
//!   ┌────────────────────────────────────────────────────┐
//!   │ FeedTask                                            │
//!   │   IngestPipeline { seen, emitted, debouncer, buffer }│
//!   │   live forwarders ◄── Subscription per source       │
//!   │   page fetches    ◄── fetch_page(sources, cursor)   │
//!   └────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use loopfeed::feed::{FeedConfig, FeedHandle, FeedKey};
//! use loopfeed::source::{ContentSource, MemorySource};
//!
//! # async fn example() -> loopfeed::error::Result<()> {
//! let relay: Arc<dyn ContentSource> = Arc::new(MemorySource::new("relay"));
//! let feed = FeedHandle::spawn(FeedKey::Discovery, vec![relay], FeedConfig::default());
//!
//! feed.start().await?;
//! let state = feed.wait_for(|s| !s.is_loading_initial).await?;
//! println!("{} items", state.len());
//!
//! feed.load_more().await?;
//! feed.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handle;
pub mod key;
pub mod pipeline;
pub mod state;

pub use config::{FeedConfig, DEFAULT_DEBOUNCE_WINDOW, DEFAULT_PAGE_SIZE, DEFAULT_QUERY_TIMEOUT};
pub use handle::FeedHandle;
pub use key::FeedKey;
pub use pipeline::{IngestPipeline, Ingested, PageMerge};
pub use state::{FeedError, FeedState, SubscriptionPhase};

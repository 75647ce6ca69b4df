//! Cursor-based backward pagination
//!
//! A feed extends itself backward in time by asking every source for records
//! strictly older than its oldest item. The cursor is always derived from the
//! feed's current items, never from a cache: only the *initial* page may be
//! served from the [`PageCache`], because continuation state is
//! point-in-time.
//!
//! ```text
//!   items: [t=900, t=800, ..., t=500]      cursor = 500
//!                                           until  = 499
//!   fetch_page(sources, {until: 499, limit: 50}, 30s)
//!       ├── all sources sent end-of-stored ──► merge
//!       ├── timeout ─────────────────────────► merge what arrived
//!       └── every source failed ─────────────► error, items kept
//! ```

pub mod fetch;
pub mod query;

pub use fetch::{fetch_page, Page};
pub use query::{Cursor, PageKind, PageQuery};

use crate::cache::SharedCache;
use crate::content::ContentRecord;
use crate::feed::FeedKey;

/// Initial-page cache: records per feed, secondary flag is `has_more`
pub type PageCache = SharedCache<FeedKey, Vec<ContentRecord>>;

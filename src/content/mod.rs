//! Content records and ordering
//!
//! Typed content as delivered by sources. Sources are untrusted, so every
//! record passes [`ContentRecord::validate`] before it reaches a feed.

pub mod ordering;
pub mod record;

pub use ordering::FeedOrdering;
pub use record::{ContentId, ContentRecord, OwnerId};

//! Network content sources
//!
//! A source is one relay (or any other producer of content records). The
//! feed layer only sees the narrow [`ContentSource`] capability: open a
//! filtered subscription, read events, cancel. Transport and wire parsing
//! live behind implementations of this trait.
//!
//! ```text
//!   [Relay A]        [Relay B]        [Relay C]
//!       │                │                │
//!   Subscription     Subscription     Subscription
//!       │                │                │
//!       └───────────┬────┴────────────────┘
//!                   ▼
//!          Feed task (dedup, order, debounce)
//! ```

pub mod filter;
pub mod memory;
pub mod subscription;

pub use filter::Filter;
pub use memory::MemorySource;
pub use subscription::{
    SourceEvent, Subscription, SubscriptionSender, DEFAULT_SUBSCRIPTION_CAPACITY,
};

use crate::error::Result;

/// A producer of content records
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Open a subscription
    ///
    /// The source first delivers stored records matching the filter, then
    /// [`SourceEvent::EndOfStoredEvents`], then (for open-ended filters)
    /// records as they are published, until the subscription is cancelled.
    async fn subscribe(&self, filter: &Filter) -> Result<Subscription>;

    /// Human-readable source name for logs
    fn name(&self) -> &str;
}

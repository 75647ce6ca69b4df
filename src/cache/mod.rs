//! TTL keyed cache
//!
//! One cache instance exists per entity kind (e.g. one for initial feed pages)
//! and lives as long as the scope that created it. There are no process-wide
//! caches.
//!
//! ```
//! use loopfeed::cache::TtlCache;
//!
//! let mut cache: TtlCache<String, Vec<u32>> = TtlCache::new();
//! cache.put("profile:alice".to_string(), vec![1, 2], true);
//! assert_eq!(cache.get(&"profile:alice".to_string()), Some((vec![1, 2], true)));
//! ```

pub mod config;
pub mod ttl;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use config::CacheConfig;
pub use ttl::{CacheEntry, TtlCache};

/// A cache shared by the feeds of one entity kind
pub type SharedCache<K, V> = Arc<Mutex<TtlCache<K, V>>>;

/// Create a shared cache
pub fn shared<K, V>(config: CacheConfig) -> SharedCache<K, V>
where
    K: Eq + std::hash::Hash + Clone,
    V: Clone,
{
    Arc::new(Mutex::new(TtlCache::with_config(config)))
}

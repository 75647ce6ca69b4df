//! Time-to-live keyed cache
//!
//! Entries expire lazily: nothing sweeps in the background, a read that finds
//! an entry older than the TTL removes it and reports a miss. Time comes from
//! `tokio::time::Instant`, so paused-clock tests drive expiry exactly.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use super::config::CacheConfig;

/// A cached value with its insertion time
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    /// Key the entry is stored under
    pub key: K,
    /// Cached value
    pub value: V,
    /// When the value was stored
    pub inserted_at: Instant,
    /// Caller-defined flag stored next to the value (e.g. "has more pages")
    pub secondary_flag: bool,
}

impl<K, V> CacheEntry<K, V> {
    /// Age of the entry at `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    /// Whether the entry is still valid at `now` for the given TTL
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) <= ttl
    }
}

/// Keyed cache with expiry-on-read
///
/// Not synchronized; wrap in [`SharedCache`](super::SharedCache) to share
/// between tasks.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<K, V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache with the default TTL (10 minutes)
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: config.ttl,
        }
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a value, replacing any previous entry for the key
    pub fn put(&mut self, key: K, value: V, secondary_flag: bool) {
        self.put_at(key, value, secondary_flag, Instant::now());
    }

    /// Store a value as if inserted at `now`
    pub fn put_at(&mut self, key: K, value: V, secondary_flag: bool, now: Instant) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            inserted_at: now,
            secondary_flag,
        };
        self.entries.insert(key, entry);
    }

    /// Look up a value, evicting it if expired
    pub fn get(&mut self, key: &K) -> Option<(V, bool)> {
        self.get_at(key, Instant::now())
    }

    /// Look up a value as of `now`, evicting it if expired
    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<(V, bool)> {
        let entry = self.entries.get(key)?;

        if entry.is_fresh(now, self.ttl) {
            return Some((entry.value.clone(), entry.secondary_flag));
        }

        self.entries.remove(key);
        tracing::trace!(ttl_secs = self.ttl.as_secs(), "Cache entry expired on read");
        None
    }

    /// Check whether a fresh entry exists without evicting
    pub fn contains_key(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_fresh(now, self.ttl))
    }

    /// Remove one entry
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

//! Cache configuration

use std::time::Duration;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry stays readable after insertion
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

impl CacheConfig {
    /// Set the time-to-live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(CacheConfig::default().ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_builder_ttl() {
        let config = CacheConfig::default().ttl(Duration::from_secs(30));
        assert_eq!(config.ttl, Duration::from_secs(30));
    }
}

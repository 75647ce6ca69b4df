//! Feed configuration

use std::time::Duration;

/// Default quiet window before live items are emitted
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Default number of records requested per page
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Default upper bound on a page query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Feed configuration options
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Debounce window for live emissions
    pub debounce_window: Duration,

    /// Records requested per page (initial and older)
    pub page_size: usize,

    /// Maximum wait for a page query to finish
    pub query_timeout: Duration,

    /// Maximum wait for sources to accept a live subscription
    pub subscribe_timeout: Duration,

    /// Depth of the command and event channels
    pub channel_capacity: usize,

    /// Start with buffering enabled
    pub start_buffered: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            page_size: DEFAULT_PAGE_SIZE,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            subscribe_timeout: Duration::from_secs(10),
            channel_capacity: 256,
            start_buffered: false,
        }
    }
}

impl FeedConfig {
    /// Set the debounce window
    pub fn debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Set the page size (at least 1)
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Set the page query timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the live subscribe timeout
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Set the command and live channel capacity (at least 1)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Start in buffered mode
    pub fn start_buffered(mut self) -> Self {
        self.start_buffered = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();

        assert_eq!(config.debounce_window, Duration::from_millis(500));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert!(!config.start_buffered);
    }

    #[test]
    fn test_builder_page_size_floor() {
        let config = FeedConfig::default().page_size(0).channel_capacity(0);
        assert_eq!(config.page_size, 1);
        assert_eq!(config.channel_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = FeedConfig::default()
            .debounce_window(Duration::from_millis(100))
            .page_size(20)
            .query_timeout(Duration::from_secs(5))
            .subscribe_timeout(Duration::from_secs(2))
            .start_buffered();

        assert_eq!(config.debounce_window, Duration::from_millis(100));
        assert_eq!(config.page_size, 20);
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.subscribe_timeout, Duration::from_secs(2));
        assert!(config.start_buffered);
    }
}

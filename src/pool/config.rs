//! Pool configuration

use std::time::Duration;

/// Default ceiling on live playback resources
pub const DEFAULT_MAX_RESOURCES: usize = 3;

/// Fraction of the ceiling a sweep evicts down to
pub const DEFAULT_EVICTION_TARGET: f64 = 0.7;

/// Resource pool configuration options
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum live handles (requested, initializing or ready)
    pub max_resources: usize,

    /// Sweeps evict until live count is at most `floor(ratio * max)`
    pub eviction_target: f64,

    /// Interval of the background maintenance task
    pub maintenance_interval: Duration,

    /// Construction attempts for transient failures
    pub max_attempts: u32,

    /// Delay between construction attempts
    pub retry_delay: Duration,

    /// Construction timeout for progressive files
    pub construction_timeout: Duration,

    /// Construction timeout for adaptive streams (`.m3u8`, `.mpd`)
    pub adaptive_construction_timeout: Duration,

    /// Re-dispatches allowed after a corrupted artifact is removed
    pub max_self_invalidations: u32,

    /// Capacity of the pool event broadcast channel
    pub event_capacity: usize,

    /// How long an untouched failed handle stays before maintenance drops it
    pub failed_retention: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_resources: DEFAULT_MAX_RESOURCES,
            eviction_target: DEFAULT_EVICTION_TARGET,
            maintenance_interval: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            construction_timeout: Duration::from_secs(30),
            adaptive_construction_timeout: Duration::from_secs(60),
            max_self_invalidations: 1,
            event_capacity: 64,
            failed_retention: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    /// Set the live resource ceiling (at least 1)
    pub fn max_resources(mut self, max: usize) -> Self {
        self.max_resources = max.max(1);
        self
    }

    /// Set the sweep target ratio (clamped to `0.0..=1.0`)
    pub fn eviction_target(mut self, ratio: f64) -> Self {
        self.eviction_target = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set the maintenance interval
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Set construction attempts (at least 1)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the delay between attempts
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set both construction timeouts
    pub fn construction_timeouts(mut self, progressive: Duration, adaptive: Duration) -> Self {
        self.construction_timeout = progressive;
        self.adaptive_construction_timeout = adaptive;
        self
    }

    /// Set the corrupted-artifact re-dispatch cap
    pub fn max_self_invalidations(mut self, cap: u32) -> Self {
        self.max_self_invalidations = cap;
        self
    }

    /// Set how long failed handles are kept for the UI
    pub fn failed_retention(mut self, retention: Duration) -> Self {
        self.failed_retention = retention;
        self
    }

    /// Live count a sweep evicts down to
    pub fn eviction_floor(&self) -> usize {
        (self.max_resources as f64 * self.eviction_target).floor() as usize
    }

    /// Construction timeout for a locator
    pub fn timeout_for(&self, locator: &str) -> Duration {
        if is_adaptive_stream(locator) {
            self.adaptive_construction_timeout
        } else {
            self.construction_timeout
        }
    }
}

/// Whether a locator names an adaptive stream manifest
pub fn is_adaptive_stream(locator: &str) -> bool {
    let path = locator
        .split(['?', '#'])
        .next()
        .unwrap_or(locator)
        .to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".mpd")
}

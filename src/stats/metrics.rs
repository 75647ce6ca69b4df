//! Statistics for feeds and the resource pool

/// Per-feed ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Records delivered by sources (live and paged)
    pub received: u64,
    /// Records discarded because their id was already seen
    pub duplicates: u64,
    /// Records discarded by validation
    pub malformed: u64,
    /// Records routed to the side buffer
    pub buffered: u64,
    /// Snapshots published with changed items
    pub emissions: u64,
}

impl IngestStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that made it into the feed or its buffer
    pub fn accepted(&self) -> u64 {
        self.received - self.duplicates - self.malformed
    }

    /// Share of received records that were duplicates, in `[0, 1]`
    pub fn duplicate_ratio(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.received as f64
        }
    }
}

/// Pool-wide resource statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles waiting for construction to start
    pub requested: usize,
    /// Handles being constructed
    pub initializing: usize,
    /// Handles with a usable resource
    pub ready: usize,
    /// Handles whose construction failed
    pub failed: usize,
    /// Configured ceiling on live handles
    pub max_resources: usize,
    /// Estimated memory held by ready resources, in bytes
    pub estimated_bytes: usize,
    /// Constructions that ended in `Failed`, ever
    pub total_failures: u64,
    /// Handles removed by maintenance or memory pressure, ever
    pub total_evictions: u64,
}

impl PoolStats {
    /// Handles counted against the ceiling
    pub fn live(&self) -> usize {
        self.requested + self.initializing + self.ready
    }

    /// Every handle in the pool
    pub fn total(&self) -> usize {
        self.live() + self.failed
    }

    /// Whether the live count exceeds the ceiling
    pub fn over_budget(&self) -> bool {
        self.live() > self.max_resources
    }
}

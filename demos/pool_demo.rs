//! Resource pool demo with a simulated playback engine
//!
//! Run with: cargo run --example pool_demo

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loopfeed::content::ContentId;
use loopfeed::pool::{
    ArtifactStore, PlaybackEngine, PlaybackResource, PoolConfig, PoolEvent, Priority,
    ResourceError, ResourcePool,
};

/// Engine whose resources fail transiently once for locators containing
/// "flaky" and report a corrupted artifact once for "stale"
struct SimulatedEngine {
    seen: Mutex<HashSet<String>>,
}

struct SimulatedPlayer {
    locator: String,
    fail_with: Option<ResourceError>,
}

#[async_trait::async_trait]
impl PlaybackResource for SimulatedPlayer {
    async fn initialize(&mut self) -> Result<(), ResourceError> {
        tokio::time::sleep(Duration::from_millis(40)).await;
        match self.fail_with.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn dispose(&mut self) {
        tracing::debug!(locator = %self.locator, "Player disposed");
    }

    fn estimated_bytes(&self) -> usize {
        8 * 1024 * 1024
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn create(
        &self,
        _content_id: &ContentId,
        locator: &str,
    ) -> Result<Box<dyn PlaybackResource>, ResourceError> {
        let first_time = self
            .seen
            .lock()
            .map(|mut seen| seen.insert(locator.to_string()))
            .unwrap_or(false);

        let fail_with = if !first_time {
            None
        } else if locator.contains("flaky") {
            Some(ResourceError::classify("connection reset by peer"))
        } else if locator.contains("stale") {
            Some(ResourceError::classify("cached segment corrupt"))
        } else {
            None
        };

        Ok(Box::new(SimulatedPlayer {
            locator: locator.to_string(),
            fail_with,
        }))
    }
}

struct DiskCache;

#[async_trait::async_trait]
impl ArtifactStore for DiskCache {
    async fn remove(&self, locator: &str) -> bool {
        println!("  disk cache: removed {}", locator);
        true
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("loopfeed=info".parse()?)
                .add_directive("pool_demo=debug".parse()?),
        )
        .init();

    let engine = Arc::new(SimulatedEngine {
        seen: Mutex::new(HashSet::new()),
    });
    let config = PoolConfig::default()
        .max_resources(3)
        .retry_delay(Duration::from_millis(100))
        .maintenance_interval(Duration::from_secs(1));
    let pool = Arc::new(
        ResourcePool::with_config(engine, config).with_artifact_store(Arc::new(DiskCache)),
    );
    let maintenance = pool.spawn_maintenance_task();

    let mut events = pool.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PoolEvent::Ready(id) => println!("  ready    {}", id),
                PoolEvent::Failed(id, err) => println!("  failed   {} ({})", id, err),
                PoolEvent::Evicted(id) => println!("  evicted  {}", id),
                PoolEvent::Released(id) => println!("  released {}", id),
            }
        }
    });

    // Scrolling: the viewport moves down one item at a time
    let clips = ["v1", "v2-flaky", "v3", "v4-stale", "v5"];
    for (idx, clip) in clips.iter().enumerate() {
        let id = ContentId::new(*clip);
        println!("viewing {}", id);
        pool.set_active(Some(id.clone())).await;
        pool.request(id, format!("https://cdn.example/{}.mp4", clip), Priority::Current)
            .await?;

        if let Some(next) = clips.get(idx + 1) {
            pool.request(
                ContentId::new(*next),
                format!("https://cdn.example/{}.mp4", next),
                Priority::Nearby,
            )
            .await?;
        }

        tokio::time::sleep(Duration::from_millis(400)).await;

        let stats = pool.stats().await;
        println!(
            "  pool: {} live / {} max, {} failed, ~{} MiB, {} evictions",
            stats.live(),
            stats.max_resources,
            stats.failed,
            stats.estimated_bytes / (1024 * 1024),
            stats.total_evictions
        );
    }

    println!("memory warning");
    let released = pool.on_memory_pressure(pool.active().await.as_ref()).await;
    println!("  released {} resource(s)", released);

    pool.shutdown().await;
    maintenance.await?;

    Ok(())
}

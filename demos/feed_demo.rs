//! Feed demo: two in-memory relays feeding one discovery feed
//!
//! Run with: cargo run --example feed_demo
//!
//! Set `RUST_LOG=loopfeed=trace` for per-record detail.

use std::sync::Arc;
use std::time::Duration;

use loopfeed::cache::{self, CacheConfig};
use loopfeed::content::ContentRecord;
use loopfeed::feed::{FeedConfig, FeedHandle, FeedKey, SubscriptionPhase};
use loopfeed::paginate::PageCache;
use loopfeed::source::{ContentSource, MemorySource};

fn clip(id: &str, owner: &str, created_at: i64, loops: u64) -> ContentRecord {
    ContentRecord::new(id, owner, created_at, format!("https://cdn.example/{}.mp4", id))
        .with_loops(loops)
        .with_title(format!("clip {}", id))
}

fn print_items(label: &str, feed: &FeedHandle) {
    let state = feed.snapshot();
    println!(
        "{} (generation {}, has_more {}, oldest {:?}):",
        label, state.generation, state.has_more, state.oldest_seen_timestamp
    );
    for item in &state.items {
        println!(
            "  {:>6}  t={:<5} loops={:<4} raw={}B",
            item.id,
            item.created_at,
            item.loops(),
            item.raw.len()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("loopfeed=debug".parse()?)
                .add_directive("feed_demo=debug".parse()?),
        )
        .init();

    // Overlapping history on both relays exercises dedup
    let relay_a = Arc::new(MemorySource::with_records(
        "relay-a",
        (1..=30)
            .map(|i| clip(&format!("a{}", i), "alice", i * 10, (i as u64 * 7) % 13))
            .collect(),
    ));
    let relay_b = Arc::new(MemorySource::with_records(
        "relay-b",
        (20..=40)
            .map(|i| clip(&format!("a{}", i), "alice", i * 10, (i as u64 * 7) % 13))
            .collect(),
    ));
    let sources: Vec<Arc<dyn ContentSource>> = vec![relay_a.clone(), relay_b.clone()];

    let page_cache: PageCache = cache::shared(CacheConfig::default());
    let config = FeedConfig::default().page_size(10);
    let feed = FeedHandle::spawn_with_cache(
        FeedKey::Discovery,
        sources.clone(),
        config.clone(),
        Some(page_cache.clone()),
    );

    feed.start().await?;
    feed.wait_for(|s| s.phase == SubscriptionPhase::Active && !s.is_loading_initial)
        .await?;
    print_items("Initial page", &feed);

    feed.load_more().await?;
    feed.wait_for(|s| !s.is_loading_more && s.len() > 10).await?;
    print_items("After load_more", &feed);

    // A burst of live records, including a duplicate, lands as one update
    relay_a.publish(clip("live1", "bob", 1_000, 3));
    relay_b.publish(clip("live1", "bob", 1_000, 3));
    relay_b.publish(clip("live2", "carol", 1_001, 9));
    feed.wait_for(|s| s.items.first().map(|r| r.id.as_str()) == Some("live2"))
        .await?;
    print_items("After live burst", &feed);

    // While the user scrolls, new items wait in the side buffer
    feed.set_buffering(true).await?;
    relay_a.publish(clip("live3", "dave", 1_002, 1));
    let mut buffered = feed.watch_buffered();
    buffered.wait_for(|n| *n > 0).await?;
    println!("{} new item(s) waiting", feed.buffered_count());
    feed.load_buffered_videos().await?;
    feed.set_buffering(false).await?;
    feed.wait_for(|s| s.items.first().map(|r| r.id.as_str()) == Some("live3"))
        .await?;
    print_items("After loading buffered", &feed);

    let stats = feed.stats().await?;
    println!(
        "ingest: received {}, duplicates {} ({:.0}%), malformed {}, emissions {}",
        stats.received,
        stats.duplicates,
        stats.duplicate_ratio() * 100.0,
        stats.malformed,
        stats.emissions
    );

    // Popular ranks the same content by loop count
    let popular = FeedHandle::spawn_with_cache(
        FeedKey::Popular,
        sources,
        config,
        Some(page_cache),
    );
    popular.start().await?;
    popular
        .wait_for(|s| !s.is_loading_initial && !s.is_empty())
        .await?;
    print_items("Popular (loops first)", &popular);

    tokio::time::sleep(Duration::from_millis(50)).await;
    popular.dispose().await;
    feed.dispose().await;

    Ok(())
}

//! End-to-end: relays feed a paged feed whose visible items are materialized
//! in a bounded resource pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use loopfeed::cache::{self, CacheConfig};
use loopfeed::content::{ContentId, ContentRecord};
use loopfeed::feed::{FeedConfig, FeedHandle, FeedKey, FeedState, SubscriptionPhase};
use loopfeed::paginate::PageCache;
use loopfeed::pool::{
    PlaybackEngine, PlaybackResource, PoolConfig, Priority, ResourceError, ResourcePool,
    ResourceState,
};
use loopfeed::source::{ContentSource, MemorySource};
use loopfeed::Error;

const WAIT: Duration = Duration::from_secs(5);

struct CountingEngine {
    live: Arc<AtomicUsize>,
}

struct CountingPlayer {
    live: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl PlaybackResource for CountingPlayer {
    async fn initialize(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn dispose(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PlaybackEngine for CountingEngine {
    fn create(
        &self,
        _content_id: &ContentId,
        _locator: &str,
    ) -> Result<Box<dyn PlaybackResource>, ResourceError> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingPlayer {
            live: Arc::clone(&self.live),
        }))
    }
}

fn clip(id: &str, owner: &str, t: i64) -> ContentRecord {
    ContentRecord::new(id, owner, t, format!("https://cdn/{}.mp4", id))
}

async fn wait_for<F>(feed: &FeedHandle, predicate: F) -> FeedState
where
    F: FnMut(&FeedState) -> bool,
{
    let state = tokio::time::timeout(WAIT, feed.wait_for(predicate)).await;
    assert_ok!(assert_ok!(state))
}

#[tokio::test]
async fn test_profile_feed_pages_and_plays() {
    let mut history: Vec<ContentRecord> = (1..=25)
        .map(|i| clip(&format!("al{}", i), "alice", i * 10))
        .collect();
    history.extend((1..=5).map(|i| clip(&format!("bo{}", i), "bob", i * 10 + 5)));

    let relay_a = Arc::new(MemorySource::with_records("a", history.clone()));
    let relay_b = Arc::new(MemorySource::with_records("b", history[10..].to_vec()));
    let sources: Vec<Arc<dyn ContentSource>> = vec![relay_a.clone(), relay_b];

    let feed = FeedHandle::spawn(
        FeedKey::profile("alice"),
        sources,
        FeedConfig::default()
            .page_size(10)
            .debounce_window(Duration::from_millis(20)),
    );

    assert_ok!(feed.start().await);
    let state = wait_for(&feed, |s| {
        !s.is_loading_initial && s.phase == SubscriptionPhase::Active
    })
    .await;
    assert_eq!(state.len(), 10);
    assert!(state.items.iter().all(|r| r.owner_id.as_str() == "alice"));
    assert_eq!(state.oldest_seen_timestamp, Some(160));

    // Page until the history is exhausted
    while feed.snapshot().has_more {
        let before = feed.snapshot().generation;
        assert_ok!(feed.load_more().await);
        wait_for(&feed, |s| s.generation > before && !s.is_loading_more).await;
    }
    let state = feed.snapshot();
    assert_eq!(state.len(), 25);
    let times: Vec<i64> = state.items.iter().map(|r| r.created_at).collect();
    let mut sorted = times.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(times, sorted);

    // Bob's live post does not reach Alice's profile feed
    relay_a.publish(clip("bo-live", "bob", 1_000));
    relay_a.publish(clip("al-live", "alice", 1_001));
    let state = wait_for(&feed, |s| s.len() == 26).await;
    assert_eq!(state.items[0].id.as_str(), "al-live");

    // Materialize the viewport: current item plus two neighbours
    let live = Arc::new(AtomicUsize::new(0));
    let pool = Arc::new(ResourcePool::with_config(
        Arc::new(CountingEngine { live: live.clone() }),
        PoolConfig::default().max_resources(3),
    ));

    for (idx, item) in state.items.iter().take(6).enumerate() {
        let priority = if idx == 0 { Priority::Current } else { Priority::Nearby };
        assert_ok!(
            pool.request(item.id.clone(), item.media_locator.clone(), priority)
                .await
        );
    }
    let stats = pool.stats().await;
    assert!(stats.live() <= 3);
    assert!(stats.total_evictions >= 3);

    for _ in 0..100 {
        if pool.handles().await.iter().all(|h| h.state == ResourceState::Ready) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    pool.shutdown().await;
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_err!(
        pool.request(ContentId::new("late"), "https://cdn/late.mp4", Priority::Current)
            .await
    );

    feed.dispose().await;
    assert!(matches!(feed.refresh().await, Err(Error::Disposed)));
}

#[tokio::test]
async fn test_hashtag_feed_shares_cache_across_instances() {
    let tagged = |id: &str, t: i64| clip(id, "carol", t).with_tag("cats");
    let relay = Arc::new(MemorySource::with_records(
        "relay",
        vec![tagged("c1", 10), tagged("c2", 20), clip("dog", "carol", 30)],
    ));
    let page_cache: PageCache = cache::shared(CacheConfig::default().ttl(Duration::from_secs(60)));

    let open = |cache: PageCache| {
        FeedHandle::spawn_with_cache(
            FeedKey::hashtag("#Cats"),
            vec![relay.clone() as Arc<dyn ContentSource>],
            FeedConfig::default(),
            Some(cache),
        )
    };

    let first = open(page_cache.clone());
    assert_ok!(first.start().await);
    let state = wait_for(&first, |s| s.len() == 2).await;
    assert_eq!(state.items[0].id.as_str(), "c2");
    first.dispose().await;

    let calls_before = relay.subscribe_calls();
    let second = open(page_cache.clone());
    assert_ok!(second.start().await);
    wait_for(&second, |s| s.len() == 2 && s.phase == SubscriptionPhase::Active).await;
    assert_eq!(relay.subscribe_calls(), calls_before + 1);

    assert!(page_cache.lock().await.contains_key(&FeedKey::hashtag("cats")));
    second.dispose().await;
}

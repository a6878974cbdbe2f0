use reply_cache::cache::{
    CacheConfig, CacheKeyGenerator, KeyInput, ManualClock, MemoryCache, ResponseCache,
};
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn cache_with_clock(max_size: usize) -> (ResponseCache, ManualClock) {
    let clock = ManualClock::new();
    let backend = MemoryCache::with_clock(max_size, Arc::new(clock.clone()));
    (
        ResponseCache::new(CacheConfig::default(), Box::new(backend)),
        clock,
    )
}

#[tokio::test]
async fn test_value_returned_within_ttl() {
    let (cache, clock) = cache_with_clock(10);
    cache
        .cache_response("I feel anxious", "Take a slow breath.", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(59));
    assert_eq!(
        cache.get_cached_response("I feel anxious").await.as_deref(),
        Some("Take a slow breath.")
    );
}

#[tokio::test]
async fn test_expired_value_absent_and_removed() {
    let (cache, clock) = cache_with_clock(10);
    cache
        .cache_response("hello", "hi", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(61));
    assert_eq!(cache.get_cached_response("hello").await, None);
    let stats = cache.get_stats().await;
    assert_eq!(stats.size, 0);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 1);
}

#[tokio::test]
async fn test_default_ttl_applies() {
    let clock = ManualClock::new();
    let cache = ResponseCache::new(
        CacheConfig::new().with_ttl(Duration::from_secs(30)),
        Box::new(MemoryCache::with_clock(10, Arc::new(clock.clone()))),
    );
    cache.cache_response("q", "a", None).await.unwrap();
    clock.advance(Duration::from_secs(29));
    assert!(cache.get_cached_response("q").await.is_some());
    clock.advance(Duration::from_secs(1));
    assert!(cache.get_cached_response("q").await.is_none());
}

#[tokio::test]
async fn test_capacity_scenario_evicts_oldest() {
    let (cache, _) = cache_with_clock(2);
    cache.cache_response("a", "1", None).await.unwrap();
    cache.cache_response("b", "2", None).await.unwrap();
    cache.cache_response("c", "3", None).await.unwrap();

    assert_eq!(cache.get_cached_response("a").await, None);
    assert_eq!(cache.get_cached_response("b").await.as_deref(), Some("2"));
    assert_eq!(cache.get_cached_response("c").await.as_deref(), Some("3"));

    let stats = cache.get_stats().await;
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.size, 2);
    assert_eq!(stats.max_size, Some(2));
}

#[tokio::test]
async fn test_access_protects_from_eviction() {
    let (cache, _) = cache_with_clock(2);
    cache.cache_response("a", "1", None).await.unwrap();
    cache.cache_response("b", "2", None).await.unwrap();
    assert!(cache.get_cached_response("a").await.is_some());
    cache.cache_response("c", "3", None).await.unwrap();

    assert_eq!(cache.get_cached_response("b").await, None);
    assert_eq!(cache.get_cached_response("a").await.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_overwrite_refreshes_and_does_not_evict() {
    let (cache, clock) = cache_with_clock(2);
    cache
        .cache_response("a", "1", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    cache.cache_response("b", "2", None).await.unwrap();
    clock.advance(Duration::from_secs(9));
    cache
        .cache_response("a", "1b", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(cache.get_stats().await.evictions, 0);

    // "a" is now most recent, so "b" goes first.
    cache.cache_response("c", "3", None).await.unwrap();
    assert_eq!(cache.get_cached_response("b").await, None);

    clock.advance(Duration::from_secs(9));
    assert_eq!(cache.get_cached_response("a").await.as_deref(), Some("1b"));
}

#[tokio::test]
async fn test_hit_rate_three_hits_one_miss() {
    let (cache, _) = cache_with_clock(10);
    cache.cache_response("k", "v", None).await.unwrap();
    for _ in 0..3 {
        assert!(cache.get_cached_response("k").await.is_some());
    }
    assert!(cache.get_cached_response("other").await.is_none());
    let stats = cache.get_stats().await;
    assert_eq!((stats.hits, stats.misses), (3, 1));
    assert_eq!(stats.hit_rate, 0.75);
}

#[tokio::test]
async fn test_invalidate_absent_is_noop() {
    let (cache, _) = cache_with_clock(10);
    cache.cache_response("k", "v", None).await.unwrap();
    let before = cache.get_stats().await;
    assert!(!cache.invalidate("missing").await);
    assert_eq!(cache.get_stats().await, before);

    assert!(cache.invalidate("k").await);
    assert!(!cache.exists("k").await);
    assert_eq!(cache.get_stats().await.deletes, 1);
}

#[tokio::test]
async fn test_clear_all_keeps_lifetime_counters() {
    let (cache, _) = cache_with_clock(10);
    cache.cache_response("a", "1", None).await.unwrap();
    cache.cache_response("b", "2", None).await.unwrap();
    cache.get_cached_response("a").await;
    cache.get_cached_response("zzz").await;

    assert!(cache.clear_all().await);
    let stats = cache.get_stats().await;
    assert_eq!(stats.size, 0);
    assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 2));

    cache.reset_stats();
    let stats = cache.get_stats().await;
    assert_eq!((stats.hits, stats.misses, stats.sets), (0, 0, 0));
    assert_eq!(stats.hit_rate, 0.0);
}

#[tokio::test]
async fn test_model_and_temperature_separate_entries() {
    let (cache, _) = cache_with_clock(10);
    let input = KeyInput::new("hello").with_model("gpt-4o-mini");
    cache.cache_response(input, "from mini", None).await.unwrap();

    assert_eq!(cache.get_cached_response("hello").await, None);
    assert_eq!(
        cache.get_cached_response(input).await.as_deref(),
        Some("from mini")
    );
    assert_eq!(
        cache
            .get_cached_response(input.with_temperature(0.1))
            .await,
        None
    );
}

#[tokio::test]
async fn test_salted_generator_isolates_namespace() {
    let cache = ResponseCache::new(CacheConfig::default(), Box::new(MemoryCache::new(10)))
        .with_key_generator(CacheKeyGenerator::new().with_salt("persona-v2"));
    cache.cache_response("hi", "hello friend", None).await.unwrap();
    let plain = CacheKeyGenerator::new().generate("hi", None, None);
    assert_ne!(cache.key_for("hi"), plain);
    assert!(cache.lookup(&plain).await.is_none());
    assert!(cache.lookup(&cache.key_for("hi")).await.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access_keeps_bound_and_counts() {
    let cache = Arc::new(ResponseCache::new(
        CacheConfig::default(),
        Box::new(MemoryCache::new(32)),
    ));
    let tasks: Vec<_> = (0..8)
        .map(|worker| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let prompt = format!("message {}", (worker * 50 + i) % 64);
                    if cache.get_cached_response(&prompt).await.is_none() {
                        cache.cache_response(&prompt, "reply", Some(HOUR)).await.unwrap();
                    }
                }
            })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
    let stats = cache.get_stats().await;
    assert!(stats.size <= 32);
    assert_eq!(stats.hits + stats.misses, 400);
    assert_eq!(stats.sets, stats.misses);
}

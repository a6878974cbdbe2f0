//! Wrap an expensive reply generator with the cache.

use super::key::{CacheKey, KeyInput};
use super::manager::ResponseCache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// An expensive call guarded by a [`ResponseCache`].
///
/// `key_fn` decides what a prompt is cached under; `ttl` overrides the cache's
/// default lifetime. Hits skip the generator. Misses run it and store
/// non-empty `Ok` replies. Generator errors pass through and are never cached.
///
/// ```rust,no_run
/// use reply_cache::cache::{CachedCall, CacheConfig, MemoryCache, ResponseCache};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn demo() -> Result<(), std::io::Error> {
/// let cache = Arc::new(ResponseCache::new(CacheConfig::default(), Box::new(MemoryCache::new(100))));
/// let call = CachedCall::by_prompt(cache).with_ttl(Duration::from_secs(1800));
/// let prompt = "I feel stressed";
/// let reply = call
///     .call(prompt, || async move { Ok::<_, std::io::Error>(format!("echo: {prompt}")) })
///     .await?;
/// # let _ = reply;
/// # Ok(())
/// # }
/// ```
pub struct CachedCall<K> {
    cache: Arc<ResponseCache>,
    key_fn: K,
    ttl: Option<Duration>,
}

impl<K> CachedCall<K>
where
    K: Fn(&str) -> CacheKey + Send + Sync,
{
    pub fn new(cache: Arc<ResponseCache>, key_fn: K) -> Self {
        Self {
            cache,
            key_fn,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub async fn call<F, Fut, E>(&self, prompt: &str, generate: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let key = (self.key_fn)(prompt);
        if let Some(hit) = self.cache.lookup(&key).await {
            return Ok(hit);
        }
        let reply = generate().await?;
        if !reply.is_empty() {
            if let Err(e) = self.cache.store(&key, KeyInput::new(prompt), &reply, self.ttl).await {
                warn!(key = key.short(), error = %e, "reply not cached");
            }
        }
        Ok(reply)
    }
}

impl CachedCall<Box<dyn Fn(&str) -> CacheKey + Send + Sync>> {
    /// Key by the normalized prompt with the cache's default model and
    /// temperature, same as [`ResponseCache::get_cached_response`] on a `&str`.
    pub fn by_prompt(cache: Arc<ResponseCache>) -> Self {
        let keys = cache.key_generator().clone();
        Self::new(cache, Box::new(move |prompt: &str| keys.generate(prompt, None, None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryCache};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shared_cache() -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(
            CacheConfig::default(),
            Box::new(MemoryCache::new(16)),
        ))
    }

    #[tokio::test]
    async fn test_generator_runs_once() {
        let call = CachedCall::by_prompt(shared_cache());
        let runs = AtomicUsize::new(0);
        for _ in 0..3 {
            let reply = call
                .call("hello", || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("hi there".to_string())
                })
                .await
                .unwrap();
            assert_eq!(reply, "hi there");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let stats = call.cache().get_stats().await;
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[tokio::test]
    async fn test_errors_and_empty_replies_not_cached() {
        let call = CachedCall::by_prompt(shared_cache());
        let err = call
            .call("q", || async { Err::<String, _>("upstream down") })
            .await
            .unwrap_err();
        assert_eq!(err, "upstream down");
        call.call("q", || async { Ok::<_, &str>(String::new()) })
            .await
            .unwrap();
        assert_eq!(call.cache().get_stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_custom_key_fn_shares_entries() {
        let cache = shared_cache();
        // Every prompt maps to one key.
        let call = CachedCall::new(cache.clone(), |_: &str| CacheKey::new("constant"));
        call.call("first", || async { Ok::<_, ()>("one".to_string()) })
            .await
            .unwrap();
        let second = call
            .call("second", || async { Ok::<_, ()>("two".to_string()) })
            .await
            .unwrap();
        assert_eq!(second, "one");
    }

    #[tokio::test]
    async fn test_bad_ttl_still_returns_reply() {
        let call = CachedCall::by_prompt(shared_cache()).with_ttl(Duration::ZERO);
        let reply = call
            .call("q", || async { Ok::<_, ()>("a".to_string()) })
            .await
            .unwrap();
        assert_eq!(reply, "a");
        assert_eq!(call.cache().get_stats().await.size, 0);
    }
}

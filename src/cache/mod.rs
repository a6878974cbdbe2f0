//! # Response Caching Module
//!
//! Caches chat replies so a repeated message does not pay for another
//! language-model call. A reply generator asks the cache first; on a miss it
//! generates the reply and writes it back with a time-to-live.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Front door: keys, TTL, statistics, fail-open policy |
//! | [`CacheConfig`] | Default TTL, enable switch, entry size limit |
//! | [`CacheBackend`] | Trait for storage backends |
//! | [`MemoryCache`] | In-process LRU store with lazy TTL |
//! | [`RedisCache`] | Redis store, expiration enforced server-side |
//! | [`NullCache`] | No-op store for disabled caching |
//! | [`CacheKey`] | SHA-256 fingerprint of the normalized prompt and parameters |
//! | [`CachedCall`] | Wraps a generator function with lookup and write-back |
//!
//! ## Example
//!
//! ```rust
//! use reply_cache::cache::{CacheConfig, MemoryCache, ResponseCache};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> reply_cache::Result<()> {
//! let cache = ResponseCache::new(
//!     CacheConfig::new().with_ttl(Duration::from_secs(3600)),
//!     Box::new(MemoryCache::new(1000)),
//! );
//! cache.cache_response("Hello", "Hi! How are you feeling today?", None).await?;
//! assert!(cache.get_cached_response("  hello ").await.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Semantics
//!
//! A backend that errors or times out is logged and treated as a miss. The
//! caller always falls through to generating the reply itself.

mod backend;
mod call;
mod clock;
mod key;
mod manager;
mod memory;
mod remote;

pub use backend::{CacheBackend, NullCache, RemovalCounts};
pub use call::CachedCall;
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{normalize_prompt, CacheKey, CacheKeyGenerator, KeyInput, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
pub use manager::{CacheConfig, CacheStats, CachedReply, ResponseCache, MAX_TTL};
pub use memory::{EntryMeta, MemoryCache};
pub use remote::{RedisCache, RedisCacheConfig};

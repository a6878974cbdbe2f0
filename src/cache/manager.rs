//! Response cache front: key derivation, reply records, statistics and the
//! fail-open policy.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use super::backend::CacheBackend;
use super::key::{CacheKey, CacheKeyGenerator, KeyInput};
use crate::{Error, ErrorContext, Result};

/// Prompt characters kept alongside a reply for debugging.
const PROMPT_PREVIEW_CHARS: usize = 100;

/// Longest lifetime an entry gets; longer TTLs are cut down to this.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig { pub default_ttl: Duration, pub enabled: bool, pub max_entry_size: usize }

impl Default for CacheConfig {
    fn default() -> Self { Self { default_ttl: Duration::from_secs(3600), enabled: true, max_entry_size: 1024 * 1024 } }
}

impl CacheConfig {
    pub fn new() -> Self { Self::default() }
    pub fn with_ttl(mut self, ttl: Duration) -> Self { self.default_ttl = ttl; self }
    pub fn with_enabled(mut self, enabled: bool) -> Self { self.enabled = enabled; self }
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self { self.max_entry_size = bytes; self }
}

/// What actually goes into the backend for one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedReply {
    pub response: String,
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub cached_at: u64,
}

impl CachedReply {
    fn new(prompt: &str, response: &str, model: &str, temperature: f64) -> Self {
        let cached_at = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        Self {
            response: response.to_string(),
            prompt: prompt.chars().take(PROMPT_PREVIEW_CHARS).collect(),
            model: model.to_string(),
            temperature,
            cached_at,
        }
    }
}

/// Point-in-time statistics. Counters are lifetime-scoped; `size` is the
/// backend's current entry count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub backend: &'static str,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or `0.0` before the first lookup.
    pub hit_rate: f64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    /// `None` when the backend bounds itself (Redis).
    pub max_size: Option<usize>,
    /// `size / max_size` as a percentage; `None` alongside `max_size`.
    pub utilization: Option<f64>,
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 { 0.0 } else { hits as f64 / total as f64 }
}

fn utilization(size: usize, max_size: Option<usize>) -> Option<f64> {
    max_size.map(|max| if max == 0 { 0.0 } else { size as f64 / max as f64 * 100.0 })
}

struct AtomicStats { hits: AtomicU64, misses: AtomicU64, sets: AtomicU64, deletes: AtomicU64, errors: AtomicU64 }
impl AtomicStats {
    fn new() -> Self { Self { hits: AtomicU64::new(0), misses: AtomicU64::new(0), sets: AtomicU64::new(0), deletes: AtomicU64::new(0), errors: AtomicU64::new(0) } }
    fn reset(&self) {
        for c in [&self.hits, &self.misses, &self.sets, &self.deletes, &self.errors] { c.store(0, Ordering::Relaxed); }
    }
}

/// The cache a reply generator talks to.
///
/// Construct once at startup and share it (`Arc<ResponseCache>`); every method
/// takes `&self`. Backend failures never reach the caller: lookups degrade to
/// misses and writes report `false`, with a warning logged and `errors`
/// incremented. The only error surfaced is a zero TTL passed to a write.
pub struct ResponseCache { config: CacheConfig, backend: Box<dyn CacheBackend>, keys: CacheKeyGenerator, stats: AtomicStats }

impl ResponseCache {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        info!(backend = backend.name(), enabled = config.enabled, ttl_secs = config.default_ttl.as_secs(), "ResponseCache initialized");
        Self { config, backend, keys: CacheKeyGenerator::new(), stats: AtomicStats::new() }
    }

    pub fn with_key_generator(mut self, keys: CacheKeyGenerator) -> Self { self.keys = keys; self }

    pub fn key_generator(&self) -> &CacheKeyGenerator { &self.keys }
    pub fn config(&self) -> &CacheConfig { &self.config }
    pub fn is_enabled(&self) -> bool { self.config.enabled }
    pub fn backend_name(&self) -> &'static str { self.backend.name() }

    pub fn key_for<'a>(&self, input: impl Into<KeyInput<'a>>) -> CacheKey { self.keys.generate_for(input.into()) }

    /// Cached reply for `input`, or `None` on a miss (including an expired
    /// entry or an unreachable backend).
    pub async fn get_cached_response<'a>(&self, input: impl Into<KeyInput<'a>>) -> Option<String> {
        let key = self.key_for(input);
        self.lookup(&key).await
    }

    /// Store `response` for `input` with `ttl` (or the default TTL).
    ///
    /// Returns `Ok(true)` when stored, `Ok(false)` when skipped (disabled,
    /// oversized, backend failure), and a configuration error for a zero TTL.
    pub async fn cache_response<'a>(&self, input: impl Into<KeyInput<'a>>, response: &str, ttl: Option<Duration>) -> Result<bool> {
        let input = input.into();
        let key = self.keys.generate_for(input);
        self.store(&key, input, response, ttl).await
    }

    /// Remove the entry for `input`; `false` if there was none.
    pub async fn invalidate<'a>(&self, input: impl Into<KeyInput<'a>>) -> bool {
        let key = self.key_for(input);
        self.remove(&key).await
    }

    pub async fn exists<'a>(&self, input: impl Into<KeyInput<'a>>) -> bool {
        if !self.config.enabled { return false; }
        let key = self.key_for(input);
        match self.backend.exists(&key).await {
            Ok(found) => found,
            Err(e) => { self.fail_open("exists", &e); false }
        }
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<String> {
        if !self.config.enabled { return None; }
        match self.backend.get(key).await {
            Ok(Some(data)) => match serde_json::from_slice::<CachedReply>(&data) {
                Ok(reply) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = key.short(), "cache hit");
                    Some(reply.response)
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    warn!(key = key.short(), error = %e, "undecodable cache entry, dropping it");
                    if let Err(e) = self.backend.delete(key).await { self.fail_open("delete", &e); }
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key.short(), "cache miss");
                None
            }
            Err(e) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                self.fail_open("get", &e);
                None
            }
        }
    }

    /// Write under an already derived `key`; `input` fills in the record's
    /// prompt preview, model and temperature.
    pub async fn store(&self, key: &CacheKey, input: KeyInput<'_>, response: &str, ttl: Option<Duration>) -> Result<bool> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() {
            return Err(Error::configuration_with_context("cache ttl must be positive", ErrorContext::new().with_field_path("ttl").with_source("response_cache")));
        }
        let ttl = ttl.min(MAX_TTL);
        if !self.config.enabled { return Ok(false); }
        let reply = CachedReply::new(input.prompt, response, self.keys.model_for(&input), self.keys.temperature_for(&input));
        let data = serde_json::to_vec(&reply)?;
        if data.len() > self.config.max_entry_size {
            debug!(key = key.short(), bytes = data.len(), limit = self.config.max_entry_size, "reply too large to cache");
            return Ok(false);
        }
        match self.backend.set(key, &data, ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = key.short(), ttl_secs = ttl.as_secs(), "cached reply");
                Ok(true)
            }
            Err(e) => { self.fail_open("set", &e); Ok(false) }
        }
    }

    pub async fn remove(&self, key: &CacheKey) -> bool {
        if !self.config.enabled { return false; }
        match self.backend.delete(key).await {
            Ok(removed) => {
                if removed { self.stats.deletes.fetch_add(1, Ordering::Relaxed); }
                removed
            }
            Err(e) => { self.fail_open("delete", &e); false }
        }
    }

    /// Drop every entry. Lifetime counters are kept; see [`Self::reset_stats`].
    pub async fn clear_all(&self) -> bool {
        match self.backend.clear().await {
            Ok(()) => { info!(backend = self.backend.name(), "cache cleared"); true }
            Err(e) => { self.fail_open("clear", &e); false }
        }
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
        self.backend.reset_counts();
    }

    pub async fn get_stats(&self) -> CacheStats {
        let size = match self.backend.len().await {
            Ok(n) => n,
            Err(e) => { warn!(backend = self.backend.name(), error = %e, "could not read cache size"); 0 }
        };
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let removals = self.backend.removal_counts();
        let max_size = self.backend.capacity();
        CacheStats {
            enabled: self.config.enabled,
            backend: self.backend.name(),
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
            sets: self.stats.sets.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            evictions: removals.evictions,
            expirations: removals.expirations,
            size,
            max_size,
            utilization: utilization(size, max_size),
        }
    }

    fn fail_open(&self, op: &'static str, err: &Error) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(backend = self.backend.name(), op, error = %err, "cache backend error, continuing without cache");
    }
}

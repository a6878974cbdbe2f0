//! In-process LRU backend with lazy TTL expiration.

use super::backend::{CacheBackend, RemovalCounts};
use super::clock::{Clock, SystemClock};
use super::key::{short_hash, CacheKey};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    inserted_at: Instant,
    /// `None` when `now + ttl` does not fit in an `Instant`.
    expires_at: Option<Instant>,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(data: Vec<u8>, now: Instant, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at: now,
            expires_at: now.checked_add(ttl),
            last_accessed: now,
        }
    }
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Timestamps of a stored entry, as seen by [`MemoryCache::inspect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub inserted_at: Instant,
    /// `None` for a TTL too long to represent; such an entry only leaves by
    /// eviction, delete or clear.
    pub expires_at: Option<Instant>,
    pub last_accessed_at: Instant,
    pub size_bytes: usize,
}

/// Bounded in-memory store.
///
/// - Recency is the LRU list order, so there are no ties: the entry at the
///   tail is always the one evicted.
/// - Expiration is checked when an entry is touched; nothing runs in the
///   background. [`MemoryCache::purge_expired`] sweeps on demand.
/// - Overwriting a key replaces the entry wholesale (fresh TTL, fresh
///   `inserted_at`) and moves it to the head without evicting anything.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryCache {
    /// `max_entries` of zero is clamped to one.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            max_entries: cap.get(),
            clock,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, CacheEntry>>> {
        self.entries.lock().map_err(|_| {
            Error::runtime_with_context(
                "MemoryCache poisoned",
                ErrorContext::new().with_source("memory_cache"),
            )
        })
    }

    /// Look at an entry without touching its recency.
    pub fn inspect(&self, key: &CacheKey) -> Result<Option<EntryMeta>> {
        let entries = self.lock()?;
        Ok(entries.peek(&key.hash).map(|e| EntryMeta {
            inserted_at: e.inserted_at,
            expires_at: e.expires_at,
            last_accessed_at: e.last_accessed,
            size_bytes: e.data.len(),
        }))
    }

    /// Remove every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            entries.pop(k);
        }
        let n = expired.len();
        if n > 0 {
            self.expirations.fetch_add(n as u64, Ordering::Relaxed);
            debug!(removed = n, "purged expired cache entries");
        }
        Ok(n)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        // Expiry is checked with `peek` so a stale entry is never promoted.
        match entries.peek(&key.hash).map(|e| e.is_expired(now)) {
            None => Ok(None),
            Some(true) => {
                entries.pop(&key.hash);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                debug!(key = key.short(), "cache entry expired");
                Ok(None)
            }
            Some(false) => Ok(entries.get_mut(&key.hash).map(|entry| {
                entry.last_accessed = now;
                entry.data.clone()
            })),
        }
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value.to_vec(), self.clock.now(), ttl);
        let mut entries = self.lock()?;
        // `push` hands back the displaced pair: the old value on overwrite,
        // or the LRU tail when a new key lands in a full cache.
        if let Some((evicted, _)) = entries.push(key.hash.clone(), entry) {
            if evicted != key.hash {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(evicted = short_hash(&evicted), "cache full, evicted LRU entry");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock()?.pop(&key.hash).is_some())
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match entries.peek(&key.hash).map(|e| e.is_expired(now)) {
            None => Ok(false),
            Some(true) => {
                entries.pop(&key.hash);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Some(false) => Ok(true),
        }
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.max_entries)
    }

    fn removal_counts(&self) -> RemovalCounts {
        RemovalCounts {
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn reset_counts(&self) {
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }
}

//! Cache backend trait and the no-op backend.

use super::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Removal counters a backend keeps on its own. Lifetime-scoped like the
/// manager's hit/miss counters: `clear` leaves them alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalCounts {
    /// Entries dropped to make room for a new key.
    pub evictions: u64,
    /// Entries found expired on access and removed.
    pub expirations: u64,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn exists(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;

    /// Entry bound enforced locally, if any. Remote stores bound themselves.
    fn capacity(&self) -> Option<usize> {
        None
    }

    fn removal_counts(&self) -> RemovalCounts {
        RemovalCounts::default()
    }

    fn reset_counts(&self) {}
}

pub struct NullCache;
impl NullCache {
    pub fn new() -> Self {
        Self
    }
}
impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: &[u8], _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn exists(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
    fn capacity(&self) -> Option<usize> {
        Some(0)
    }
}

//! Redis backend.
//!
//! Values are stored under `{prefix}{hash}` with `SET .. EX`, so Redis owns
//! expiration. Every round trip (including connecting) is bounded by
//! [`RedisCacheConfig::timeout`]; running past it yields
//! [`Error::BackendUnavailable`], which the manager turns into a miss.

use super::backend::CacheBackend;
use super::key::CacheKey;
use super::manager::MAX_TTL;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Configuration for [`RedisCache`].
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Key prefix for all cache entries. Defaults to `"reply-cache:"`.
    pub prefix: String,
    /// Upper bound for a single remote operation.
    pub timeout: Duration,
    /// Upper bound for a full keyspace `SCAN` (`len`, `clear`).
    pub scan_timeout: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            prefix: "reply-cache:".to_string(),
            timeout: Duration::from_millis(250),
            scan_timeout: Duration::from_secs(2),
        }
    }
}

impl RedisCacheConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Connection URL, with the password percent-encoded.
    pub fn url(&self) -> Result<Url> {
        let ctx = || ErrorContext::new().with_source("redis_cache");
        let mut url = Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db))
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid Redis address: {e}"),
                    ctx().with_field_path("redis.host"),
                )
            })?;
        if let Some(ref pw) = self.password {
            url.set_password(Some(pw)).map_err(|_| {
                Error::configuration_with_context(
                    "Redis URL cannot carry a password",
                    ctx().with_field_path("redis.password"),
                )
            })?;
        }
        Ok(url)
    }
}

/// What a timed-out call does to the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnTimeout {
    /// Point lookups should answer well inside the timeout; a late one
    /// suggests a dead socket.
    Reconnect,
    /// A long scan over a large keyspace is slow, not broken.
    KeepConnection,
}

impl OnTimeout {
    /// Redis errors always drop the connection.
    fn drops_connection(self, timed_out: bool) -> bool {
        !timed_out || self == OnTimeout::Reconnect
    }
}

pub struct RedisCache {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    config: RedisCacheConfig,
}

impl RedisCache {
    /// Does not connect; the first operation does, lazily.
    pub fn new(config: RedisCacheConfig) -> Result<Self> {
        let url = config.url()?;
        let client = redis::Client::open(url.as_str()).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid Redis configuration: {e}"),
                ErrorContext::new().with_source("redis_cache"),
            )
        })?;
        info!(host = %config.host, port = config.port, db = config.db, "RedisCache configured");
        Ok(Self {
            client,
            conn: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &RedisCacheConfig {
        &self.config
    }

    fn redis_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.config.prefix, key.hash)
    }

    fn unavailable(&self, op: &str, details: impl Into<String>) -> Error {
        Error::backend_with_context(
            format!("Redis {op} failed"),
            ErrorContext::new()
                .with_details(details)
                .with_source("redis_cache"),
        )
    }

    async fn connection(&self) -> redis::RedisResult<MultiplexedConnection> {
        let mut slot = self.conn.lock().await;
        if let Some(ref conn) = *slot {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        debug!(host = %self.config.host, port = self.config.port, "connected to Redis");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Run `op` on a (possibly new) connection under the configured timeout.
    /// A failed or timed-out connection is dropped so the next call reconnects.
    async fn run<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        self.run_within(name, self.config.timeout, OnTimeout::Reconnect, op)
            .await
    }

    async fn run_within<T, F, Fut>(
        &self,
        name: &str,
        limit: Duration,
        on_timeout: OnTimeout,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let attempt = async {
            let conn = self.connection().await?;
            op(conn).await
        };
        let (err, timed_out) = match tokio::time::timeout(limit, attempt).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => (self.unavailable(name, e.to_string()), false),
            Err(_) => (
                self.unavailable(name, format!("timed out after {}ms", limit.as_millis())),
                true,
            ),
        };
        if on_timeout.drops_connection(timed_out) {
            *self.conn.lock().await = None;
        }
        Err(err)
    }

    async fn matching_keys(&self) -> Result<Vec<String>> {
        let pattern = format!("{}*", self.config.prefix);
        let limit = self.config.scan_timeout;
        self.run_within("SCAN", limit, OnTimeout::KeepConnection, |mut con| async move {
            let mut keys: Vec<String> = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut con)
                    .await?;
                keys.extend(batch);
                cursor = next_cursor;
                if cursor == 0 {
                    break;
                }
            }
            Ok(keys)
        })
        .await
    }
}

/// Redis expiry has whole-second resolution; round up so an entry never
/// lives shorter than asked. Capped at [`MAX_TTL`], well inside what Redis
/// accepts for `EX`.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.clamp(1, MAX_TTL.as_secs())
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let k = self.redis_key(key);
        self.run("GET", |mut con| async move {
            redis::cmd("GET").arg(&k).query_async(&mut con).await
        })
        .await
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let k = self.redis_key(key);
        let value = value.to_vec();
        let secs = ttl_secs(ttl);
        self.run("SET", |mut con| async move {
            redis::cmd("SET")
                .arg(&k)
                .arg(value)
                .arg("EX")
                .arg(secs)
                .query_async::<()>(&mut con)
                .await
        })
        .await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let k = self.redis_key(key);
        let removed: i64 = self
            .run("DEL", |mut con| async move {
                redis::cmd("DEL").arg(&k).query_async(&mut con).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let k = self.redis_key(key);
        let found: i64 = self
            .run("EXISTS", |mut con| async move {
                redis::cmd("EXISTS").arg(&k).query_async(&mut con).await
            })
            .await?;
        Ok(found > 0)
    }

    async fn clear(&self) -> Result<()> {
        let keys = self.matching_keys().await?;
        let total = keys.len();
        // Delete in batches to avoid issues with large key sets
        for chunk in keys.chunks(100) {
            let chunk = chunk.to_vec();
            self.run("DEL", |mut con| async move {
                redis::cmd("DEL").arg(chunk).query_async::<()>(&mut con).await
            })
            .await?;
        }
        debug!(removed = total, "cleared Redis cache keys");
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.matching_keys().await?.len())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

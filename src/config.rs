//! Cache settings
//!
//! Settings are read from YAML, then overridden from the environment, then
//! validated. [`CacheSettings::build`] turns them into a [`ResponseCache`];
//! there is no process-wide instance, the service owns what it builds.
//!
//! ```yaml
//! enabled: true
//! backend: redis        # memory | redis | none
//! ttl_seconds: 1800
//! max_size: 5000
//! redis:
//!   host: cache.internal
//!   port: 6379
//!   timeout_ms: 250
//!   scan_timeout_ms: 2000
//! ```

use crate::cache::{
    CacheBackend, CacheConfig, MemoryCache, NullCache, RedisCache, RedisCacheConfig,
    ResponseCache, MAX_TTL,
};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "in-memory", alias = "inmemory")]
    Memory,
    #[serde(alias = "remote")]
    Redis,
    #[serde(alias = "null", alias = "disabled")]
    None,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(BackendKind::Memory),
            "redis" | "remote" => Ok(BackendKind::Redis),
            "none" | "null" | "disabled" => Ok(BackendKind::None),
            other => Err(Error::configuration_with_context(
                format!("unknown cache backend '{other}'"),
                ErrorContext::new()
                    .with_field_path("backend")
                    .with_details("expected memory, redis or none")
                    .with_source("settings"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub prefix: String,
    pub timeout_ms: u64,
    pub scan_timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        let d = RedisCacheConfig::default();
        Self {
            host: d.host,
            port: d.port,
            password: d.password,
            db: d.db,
            prefix: d.prefix,
            timeout_ms: d.timeout.as_millis() as u64,
            scan_timeout_ms: d.scan_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: BackendKind,
    pub ttl_seconds: u64,
    pub max_size: usize,
    pub max_entry_size: usize,
    pub redis: RedisSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let c = CacheConfig::default();
        Self {
            enabled: c.enabled,
            backend: BackendKind::Memory,
            ttl_seconds: c.default_ttl.as_secs(),
            max_size: 1000,
            max_entry_size: c.max_entry_size,
            redis: RedisSettings::default(),
        }
    }
}

fn invalid(field: &str, msg: impl Into<String>) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("settings"),
    )
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(name, format!("cannot parse '{raw}'")))
}

impl CacheSettings {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults overridden from the process environment, then validated.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup` (variable name to value).
    ///
    /// | variable | field |
    /// |---|---|
    /// | `REPLY_CACHE_ENABLED` | `enabled` |
    /// | `REPLY_CACHE_BACKEND` | `backend` |
    /// | `REPLY_CACHE_TTL_SECONDS` | `ttl_seconds` |
    /// | `REPLY_CACHE_MAX_SIZE` | `max_size` |
    /// | `REDIS_HOST` / `REDIS_PORT` / `REDIS_PASSWORD` / `REDIS_DB` | `redis.*` |
    /// | `REDIS_TIMEOUT_MS` | `redis.timeout_ms` |
    /// | `REDIS_SCAN_TIMEOUT_MS` | `redis.scan_timeout_ms` |
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REPLY_CACHE_ENABLED") {
            self.enabled = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid("REPLY_CACHE_ENABLED", format!("cannot parse '{v}'"))),
            };
        }
        if let Some(v) = lookup("REPLY_CACHE_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = lookup("REPLY_CACHE_TTL_SECONDS") {
            self.ttl_seconds = parse_var("REPLY_CACHE_TTL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("REPLY_CACHE_MAX_SIZE") {
            self.max_size = parse_var("REPLY_CACHE_MAX_SIZE", &v)?;
        }
        if let Some(v) = lookup("REDIS_HOST") {
            self.redis.host = v;
        }
        if let Some(v) = lookup("REDIS_PORT") {
            self.redis.port = parse_var("REDIS_PORT", &v)?;
        }
        if let Some(v) = lookup("REDIS_PASSWORD") {
            self.redis.password = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("REDIS_DB") {
            self.redis.db = parse_var("REDIS_DB", &v)?;
        }
        if let Some(v) = lookup("REDIS_TIMEOUT_MS") {
            self.redis.timeout_ms = parse_var("REDIS_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("REDIS_SCAN_TIMEOUT_MS") {
            self.redis.scan_timeout_ms = parse_var("REDIS_SCAN_TIMEOUT_MS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 {
            return Err(invalid("ttl_seconds", "ttl_seconds must be positive"));
        }
        if self.ttl_seconds > MAX_TTL.as_secs() {
            return Err(invalid(
                "ttl_seconds",
                format!("ttl_seconds must be at most {}", MAX_TTL.as_secs()),
            ));
        }
        if self.max_size == 0 {
            return Err(invalid("max_size", "max_size must be at least 1"));
        }
        if self.max_entry_size == 0 {
            return Err(invalid("max_entry_size", "max_entry_size must be at least 1"));
        }
        if self.backend == BackendKind::Redis {
            if self.redis.host.trim().is_empty() {
                return Err(invalid("redis.host", "redis.host must not be empty"));
            }
            if self.redis.port == 0 {
                return Err(invalid("redis.port", "redis.port must not be 0"));
            }
            if self.redis.db < 0 {
                return Err(invalid("redis.db", "redis.db must not be negative"));
            }
            if self.redis.timeout_ms == 0 {
                return Err(invalid("redis.timeout_ms", "redis.timeout_ms must be positive"));
            }
            if self.redis.scan_timeout_ms == 0 {
                return Err(invalid(
                    "redis.scan_timeout_ms",
                    "redis.scan_timeout_ms must be positive",
                ));
            }
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Caching is effectively on only when enabled and a real backend is chosen.
    pub fn is_active(&self) -> bool {
        self.enabled && self.backend != BackendKind::None
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(self.default_ttl())
            .with_enabled(self.is_active())
            .with_max_entry_size(self.max_entry_size)
    }

    pub fn redis_config(&self) -> RedisCacheConfig {
        let r = &self.redis;
        let mut cfg = RedisCacheConfig::new(r.host.clone(), r.port)
            .with_db(r.db)
            .with_prefix(r.prefix.clone())
            .with_timeout(Duration::from_millis(r.timeout_ms))
            .with_scan_timeout(Duration::from_millis(r.scan_timeout_ms));
        if let Some(ref pw) = r.password {
            cfg = cfg.with_password(pw.clone());
        }
        cfg
    }

    pub fn build_backend(&self) -> Result<Box<dyn CacheBackend>> {
        if !self.is_active() {
            return Ok(Box::new(NullCache::new()));
        }
        Ok(match self.backend {
            BackendKind::Memory => Box::new(MemoryCache::new(self.max_size)),
            BackendKind::Redis => Box::new(RedisCache::new(self.redis_config())?),
            BackendKind::None => Box::new(NullCache::new()),
        })
    }

    /// Validate and construct the cache these settings describe.
    pub fn build(&self) -> Result<ResponseCache> {
        self.validate()?;
        Ok(ResponseCache::new(self.cache_config(), self.build_backend()?))
    }
}

impl ResponseCache {
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        settings.build()
    }
}

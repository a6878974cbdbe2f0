//! # reply-cache
//!
//! Response cache for a chat front end: repeated user messages are answered
//! from the cache instead of another call to the language-model API.
//!
//! ## Overview
//!
//! The reply generator asks [`ResponseCache`] for a message first. On a miss it
//! generates the reply itself and writes it back with a time-to-live. Keys are
//! SHA-256 fingerprints of the normalized message plus the model parameters.
//!
//! ## Key Features
//!
//! - **Pluggable backends**: in-process LRU ([`cache::MemoryCache`]) or Redis
//!   ([`cache::RedisCache`]) behind one [`cache::CacheBackend`] trait
//! - **Bounded and expiring**: LRU eviction at `max_size`, lazy TTL expiry
//! - **Fail-open**: an unreachable backend degrades to misses, never errors
//! - **Statistics**: lifetime hits, misses, evictions and hit rate
//! - **Explicit construction**: [`config::CacheSettings`] builds the cache;
//!   share it with `Arc`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reply_cache::cache::CachedCall;
//! use reply_cache::config::CacheSettings;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> reply_cache::Result<()> {
//!     let cache = Arc::new(CacheSettings::from_env()?.build()?);
//!     let chat = CachedCall::by_prompt(cache.clone());
//!
//!     let prompt = "I can't sleep";
//!     let reply = chat
//!         .call(prompt, || async { Ok::<_, reply_cache::Error>("Try a short walk.".to_string()) })
//!         .await?;
//!     println!("{reply}");
//!     println!("{:?}", cache.get_stats().await);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Cache front, backends, keys and the cached-call wrapper |
//! | [`config`] | YAML / environment settings and cache construction |
//! | [`error`] | Error type with structured context |

pub mod cache;
pub mod config;

pub use cache::{CacheStats, ResponseCache};
pub use config::CacheSettings;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

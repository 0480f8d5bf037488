//! Caching layer for fast short-code lookups.
//!
//! Provides a [`CacheStore`] trait with three implementations:
//! - [`RedisCache`] - Production Redis-backed cache
//! - [`MemoryCache`] - In-process Moka cache with per-entry TTL
//! - [`NullCache`] - No-op implementation for disabled caching

mod memory_cache;
mod null_cache;
mod redis_cache;
mod service;

pub use memory_cache::MemoryCache;
pub use null_cache::NullCache;
pub use redis_cache::RedisCache;
pub use service::{CacheError, CacheResult, CacheStore};

#[cfg(test)]
pub use service::MockCacheStore;

/// Namespace prefix for mapping entries.
pub const URL_KEY_PREFIX: &str = "url:";

/// Cache key under which the original URL for `code` is stored.
pub fn url_key(code: &str) -> String {
    format!("{URL_KEY_PREFIX}{code}")
}

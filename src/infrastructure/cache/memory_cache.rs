//! In-process TTL cache backed by Moka.

use super::service::{CacheResult, CacheStore};
use async_trait::async_trait;
use moka::future::Cache;
use moka::policy::Expiry;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default upper bound on the number of cached codes.
pub const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// Expires each entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, (String, Duration)> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &(String, Duration),
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.1)
    }

    // `set` overwrites, so the TTL restarts from the new value.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &(String, Duration),
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.1)
    }
}

/// Cache store kept in process memory.
///
/// Moka evicts expired entries in the background and bounds the entry count,
/// so keys written once and never read again do not accumulate.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, (String, Duration)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        debug!(max_capacity, "MemoryCache initialized");
        Self { inner }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies pending evictions and returns the number of entries retained.
    pub async fn sweep(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.inner.get(key).await.map(|(value, _)| value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.inner
            .insert(key.to_string(), (value.to_string(), ttl))
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.inner.remove(key).await.is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.inner.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::new();
        cache
            .set("url:abc", "https://example.com", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.get("url:abc").await.unwrap().as_deref(),
            Some("https://example.com")
        );
        assert!(cache.exists("url:abc").await.unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites_value() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("k", "one", ttl).await.unwrap();
        cache.set("k", "two", ttl).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("short", "v", Duration::from_millis(50)).await.unwrap();
        cache.set("long", "v", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(!cache.exists("short").await.unwrap());
        assert!(cache.exists("long").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted_without_reads() {
        let cache = MemoryCache::new();
        for i in 0..1_000 {
            cache
                .set(&format!("url:{i}"), "v", Duration::from_millis(20))
                .await
                .unwrap();
        }
        cache
            .set("url:fresh", "v", Duration::from_secs(60))
            .await
            .unwrap();

        // Expiry timers are bucketed at roughly one-second resolution.
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_set_refreshes_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_millis(100)).await.unwrap();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(cache.exists("k").await.unwrap());
    }
}

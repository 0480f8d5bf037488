//! Redis-backed cache implementation.

use super::service::{CacheError, CacheResult, CacheStore};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis cache store.
///
/// Uses connection pooling via `ConnectionManager` for efficient connection reuse.
/// Every command runs under `op_timeout`; transport errors and timeouts are
/// returned to the caller.
pub struct RedisCache {
    client: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    /// Connects to Redis and validates the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is invalid, the connection cannot
    /// be established, or the PING health check fails.
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> CacheResult<Self> {
        info!("Connecting to Redis");

        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {e}")))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to connect to Redis: {e}")))?;

        let mut test_conn = manager.clone();
        test_conn
            .ping::<()>()
            .await
            .map_err(|e| CacheError::Connection(format!("Redis PING failed: {e}")))?;

        info!("Connected to Redis");

        Ok(Self {
            client: manager,
            op_timeout,
        })
    }

    async fn run<T, F>(&self, op: &'static str, key: &str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = Result<T, RedisError>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(key, error = %e, "Redis {} failed", op);
                if e.is_io_error() || e.is_connection_dropped() {
                    Err(CacheError::Connection(e.to_string()))
                } else {
                    Err(CacheError::Operation(e.to_string()))
                }
            }
            Err(_) => {
                warn!(key, timeout = ?self.op_timeout, "Redis {} timed out", op);
                Err(CacheError::Timeout(self.op_timeout))
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.client.clone();
        let value = self
            .run("GET", key, conn.get::<_, Option<String>>(key))
            .await?;
        debug!(key, hit = value.is_some(), "Redis GET");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.client.clone();
        let ttl_seconds = ttl.as_secs().max(1);
        self.run("SET", key, conn.set_ex::<_, _, ()>(key, value, ttl_seconds))
            .await?;
        debug!(key, ttl_seconds, "Redis SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.client.clone();
        let deleted = self.run("DEL", key, conn.del::<_, usize>(key)).await?;
        debug!(key, deleted, "Redis DEL");
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.client.clone();
        self.run("EXISTS", key, conn.exists::<_, bool>(key)).await
    }
}

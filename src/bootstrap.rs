//! Runtime wiring: backends, click worker and the mapping service.
//!
//! Picks PostgreSQL or the in-memory store, Redis or the in-process cache,
//! from [`Config`], and owns the background click worker for the lifetime of
//! the service.

use crate::application::services::{MappingService, MappingSettings};
use crate::config::Config;
use crate::domain::click_worker::run_click_worker;
use crate::domain::repositories::UnitOfWorkFactory;
use crate::infrastructure::cache::{CacheStore, MemoryCache, NullCache, RedisCache};
use crate::infrastructure::persistence::{InMemoryStore, PgUnitOfWorkFactory, connect_pool};
use crate::utils::code_generator::RandomCodeGenerator;

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A wired mapping service plus the worker draining its click queue.
pub struct Runtime {
    service: MappingService<dyn UnitOfWorkFactory>,
    pool: Option<PgPool>,
    worker: JoinHandle<()>,
}

impl Runtime {
    /// Connects the configured backends and starts the click worker.
    ///
    /// A Redis URL that cannot be reached degrades to no caching rather than
    /// failing startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is configured but unreachable.
    pub async fn start(config: &Config) -> Result<Self> {
        let (uow_factory, pool): (Arc<dyn UnitOfWorkFactory>, Option<PgPool>) =
            match config.database_url {
                Some(ref url) => {
                    let pool = connect_pool(url, config)
                        .await
                        .context("Failed to connect to database")?;
                    tracing::info!("Connected to database");
                    (Arc::new(PgUnitOfWorkFactory::new(pool.clone())), Some(pool))
                }
                None => {
                    tracing::warn!("No database configured, mappings are kept in memory");
                    (Arc::new(InMemoryStore::new()), None)
                }
            };

        let cache = connect_cache(config).await;

        let (click_tx, click_rx) = mpsc::channel(config.click_queue_capacity);
        let worker = tokio::spawn(run_click_worker(
            click_rx,
            uow_factory.clone(),
            config.click_worker_concurrency,
        ));

        let service = MappingService::new(
            uow_factory,
            cache,
            Arc::new(RandomCodeGenerator::new()),
            click_tx,
            MappingSettings::from_config(config),
        );

        Ok(Self {
            service,
            pool,
            worker,
        })
    }

    pub fn service(&self) -> &MappingService<dyn UnitOfWorkFactory> {
        &self.service
    }

    /// The PostgreSQL pool, when the database backend is in use.
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Closes the click queue and waits for queued clicks to be written.
    pub async fn shutdown(self) {
        let Self {
            service, worker, ..
        } = self;
        drop(service);

        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Click worker panicked");
        }
    }
}

async fn connect_cache(config: &Config) -> Arc<dyn CacheStore> {
    let Some(ref redis_url) = config.redis_url else {
        tracing::info!("Cache: in-process (Redis not configured)");
        return Arc::new(MemoryCache::new());
    };

    let op_timeout = Duration::from_millis(config.operation_timeout_ms);
    match RedisCache::connect(redis_url, op_timeout).await {
        Ok(redis) => {
            tracing::info!("Cache enabled (Redis)");
            Arc::new(redis)
        }
        Err(e) => {
            tracing::warn!("Failed to connect to Redis: {}. Using NullCache.", e);
            Arc::new(NullCache::new())
        }
    }
}

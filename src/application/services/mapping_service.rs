//! Mapping creation, resolution and cache invalidation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::application::dto::CreateMappingRequest;
use crate::config::Config;
use crate::domain::click_event::ClickEvent;
use crate::domain::entities::{NewUrlMapping, UrlMapping};
use crate::domain::repositories::{UnitOfWork, UnitOfWorkFactory};
use crate::error::AppError;
use crate::infrastructure::cache::{CacheStore, url_key};
use crate::utils::code_generator::{CodeGenerator, DEFAULT_CODE_LENGTH};

/// Tunables for [`MappingService`].
#[derive(Debug, Clone)]
pub struct MappingSettings {
    /// TTL of `url:<code>` cache entries. Fixed: hits never extend it.
    pub cache_ttl: Duration,
    pub code_length: usize,
    /// Upper bound on generated candidates per create call.
    pub max_attempts: usize,
    /// When set, only active rows block a code, so codes of deactivated
    /// mappings can be handed out again.
    pub allow_code_reuse: bool,
    /// Deadline for a whole create / resolve / purge / deactivate call.
    pub operation_timeout: Duration,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            code_length: DEFAULT_CODE_LENGTH,
            max_attempts: 5,
            allow_code_reuse: false,
            operation_timeout: Duration::from_millis(5000),
        }
    }
}

impl MappingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            code_length: config.code_length,
            max_attempts: config.code_max_attempts,
            allow_code_reuse: config.allow_code_reuse,
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
        }
    }
}

/// Orchestrates the cache-aside read path and the transactional write path.
///
/// The store behind `F` is authoritative. The cache only accelerates reads:
/// every cache failure degrades to store-only operation and is logged, never
/// returned, except from [`Self::purge`] whose whole job is the cache.
///
/// Each operation takes its own unit of work from the factory, so one service
/// instance can be shared across concurrent tasks.
pub struct MappingService<F: UnitOfWorkFactory + ?Sized> {
    uow_factory: Arc<F>,
    cache: Arc<dyn CacheStore>,
    generator: Arc<dyn CodeGenerator>,
    click_sender: mpsc::Sender<ClickEvent>,
    settings: MappingSettings,
}

impl<F: UnitOfWorkFactory + ?Sized> MappingService<F> {
    /// Creates a new mapping service.
    ///
    /// `click_sender` feeds [`crate::domain::click_worker::run_click_worker`];
    /// dropping the service closes the queue once all clones are gone.
    pub fn new(
        uow_factory: Arc<F>,
        cache: Arc<dyn CacheStore>,
        generator: Arc<dyn CodeGenerator>,
        click_sender: mpsc::Sender<ClickEvent>,
        settings: MappingSettings,
    ) -> Self {
        Self {
            uow_factory,
            cache,
            generator,
            click_sender,
            settings,
        }
    }

    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    /// Creates a mapping and best-effort populates the cache with it.
    ///
    /// With a custom code, the code is checked against the store and used as
    /// is. Otherwise candidates are generated until one is free, at most
    /// `max_attempts` times.
    ///
    /// Only the store write runs under the operation deadline. The cache
    /// populate happens after commit, bounded by the cache's own timeout, so
    /// a slow cache never turns a committed create into a `Timeout`.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if the request fails boundary validation
    /// - [`AppError::CodeAlreadyExists`] if the custom code is taken, either
    ///   by the pre-check or by the store's unique index
    /// - [`AppError::CodeGenerationExhausted`] if every candidate collided
    /// - [`AppError::PersistenceFailure`] if the store write fails
    /// - [`AppError::Timeout`] if the operation deadline elapses
    pub async fn create(&self, request: CreateMappingRequest) -> Result<UrlMapping, AppError> {
        request.validate()?;
        let mapping = self
            .with_deadline("create", self.create_mapping(request))
            .await?;

        self.populate_cache(&mapping).await;
        info!(
            code = %mapping.short_code,
            id = mapping.id,
            "Mapping created"
        );
        Ok(mapping)
    }

    /// Resolves a code to its original URL, counting the click.
    ///
    /// A cache hit returns at once and queues the click for the background
    /// worker. A miss reads the store, increments the click count in place and
    /// repopulates the cache.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if the code is missing, inactive or expired
    /// - [`AppError::PersistenceFailure`] if the store read fails on a miss
    /// - [`AppError::Timeout`] if the operation deadline elapses
    pub async fn resolve(&self, code: &str) -> Result<String, AppError> {
        self.with_deadline("resolve", self.resolve_code(code)).await
    }

    /// Drops the cached entry for `code`. The store record is untouched.
    ///
    /// Returns whether an entry was present; `false` is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::CacheUnavailable`] if the cache cannot be reached.
    pub async fn purge(&self, code: &str) -> Result<bool, AppError> {
        self.with_deadline("purge", async {
            let removed = self.cache.delete(&url_key(code)).await?;
            info!(code = %code, removed, "Cache entry purged");
            Ok(removed)
        })
        .await
    }

    /// Soft-deletes the active mapping for `code` and purges its cache entry.
    ///
    /// Returns `false` when there is no active mapping to deactivate.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistenceFailure`] if the store update fails.
    pub async fn deactivate(&self, code: &str) -> Result<bool, AppError> {
        self.with_deadline("deactivate", self.deactivate_code(code))
            .await
    }

    /// Returns the full stored record for `code` regardless of resolvability.
    ///
    /// No click is counted and the cache is not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no row carries the code.
    pub async fn get_mapping(&self, code: &str) -> Result<UrlMapping, AppError> {
        self.with_deadline("get_mapping", async {
            let mut uow = self.uow_factory.scope();
            uow.find_by_code(code)
                .await?
                .ok_or_else(|| AppError::not_found(code))
        })
        .await
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        let deadline = self.settings.operation_timeout;
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("url_mapper_operation_timeouts_total", "operation" => operation)
                    .increment(1);
                warn!(operation, timeout_ms = deadline.as_millis() as u64, "Operation timed out");
                Err(AppError::Timeout {
                    millis: deadline.as_millis() as u64,
                })
            }
        }
    }

    async fn create_mapping(&self, request: CreateMappingRequest) -> Result<UrlMapping, AppError> {
        let mut uow = self.uow_factory.scope();
        let CreateMappingRequest {
            original_url,
            custom_code,
            expires_at,
            title,
            description,
        } = request;
        let template = NewUrlMapping {
            original_url,
            short_code: String::new(),
            expires_at,
            title,
            description,
        };

        match custom_code {
            Some(code) => {
                if self.code_taken(uow.as_mut(), &code).await? {
                    return Err(AppError::code_exists(code));
                }
                persist(
                    uow.as_mut(),
                    NewUrlMapping {
                        short_code: code,
                        ..template
                    },
                )
                .await
            }
            None => self.persist_with_generated_code(uow.as_mut(), template).await,
        }
    }

    /// Generates candidates until one persists. A unique-index violation on
    /// insert counts as a collision like a failed pre-check.
    async fn persist_with_generated_code(
        &self,
        uow: &mut dyn UnitOfWork,
        template: NewUrlMapping,
    ) -> Result<UrlMapping, AppError> {
        let attempts = self.settings.max_attempts;

        for attempt in 1..=attempts {
            let candidate = self.generator.generate(self.settings.code_length)?;

            if self.code_taken(uow, &candidate).await? {
                metrics::counter!("url_mapper_code_collisions_total").increment(1);
                debug!(attempt, code = %candidate, "Generated code collided");
                continue;
            }

            let new_mapping = NewUrlMapping {
                short_code: candidate,
                ..template.clone()
            };
            match persist(uow, new_mapping).await {
                Err(AppError::CodeAlreadyExists { code }) => {
                    metrics::counter!("url_mapper_code_collisions_total").increment(1);
                    debug!(attempt, code = %code, "Generated code taken at insert");
                }
                result => return result,
            }
        }

        warn!(attempts, "Code generation exhausted");
        Err(AppError::CodeGenerationExhausted { attempts })
    }

    async fn code_taken(&self, uow: &mut dyn UnitOfWork, code: &str) -> Result<bool, AppError> {
        if self.settings.allow_code_reuse {
            uow.exists_active_by_code(code).await
        } else {
            uow.exists_by_code(code).await
        }
    }

    async fn resolve_code(&self, code: &str) -> Result<String, AppError> {
        match self.cache.get(&url_key(code)).await {
            Ok(Some(url)) => {
                metrics::counter!("url_mapper_cache_hits_total").increment(1);
                debug!(code = %code, "Cache hit");
                self.enqueue_click(code);
                return Ok(url);
            }
            Ok(None) => {
                metrics::counter!("url_mapper_cache_misses_total").increment(1);
                debug!(code = %code, "Cache miss");
            }
            Err(e) => {
                metrics::counter!("url_mapper_cache_errors_total").increment(1);
                warn!(code = %code, error = %e, "Cache lookup failed, reading from store");
            }
        }

        let mut uow = self.uow_factory.scope();
        let mapping = uow
            .find_by_code(code)
            .await?
            .filter(UrlMapping::is_resolvable)
            .ok_or_else(|| AppError::not_found(code))?;

        match uow.increment_click_count(code).await {
            Ok(Some(count)) => debug!(code = %code, count, "Click recorded"),
            Ok(None) => debug!(code = %code, "Mapping deactivated during resolve"),
            Err(e) => {
                metrics::counter!("url_mapper_click_increments_failed_total").increment(1);
                warn!(code = %code, error = %e, "Failed to record click");
            }
        }

        self.populate_cache(&mapping).await;
        Ok(mapping.original_url)
    }

    async fn deactivate_code(&self, code: &str) -> Result<bool, AppError> {
        let mut uow = self.uow_factory.scope();
        uow.begin_transaction().await?;

        let active = match uow.find_by_code(code).await {
            Ok(found) => found.filter(|m| m.is_active),
            Err(e) => {
                rollback_quietly(uow.as_mut()).await;
                return Err(e);
            }
        };
        let Some(mut mapping) = active else {
            rollback_quietly(uow.as_mut()).await;
            return Ok(false);
        };

        mapping.is_active = false;
        uow.update(mapping);
        save_and_commit(uow.as_mut()).await?;
        info!(code = %code, "Mapping deactivated");

        if let Err(e) = self.cache.delete(&url_key(code)).await {
            metrics::counter!("url_mapper_cache_errors_total").increment(1);
            warn!(code = %code, error = %e, "Failed to purge deactivated mapping from cache");
        }
        Ok(true)
    }

    /// Queues a click without waiting. A full or closed queue drops it.
    fn enqueue_click(&self, code: &str) {
        match self.click_sender.try_send(ClickEvent::new(code)) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                metrics::counter!("url_mapper_click_events_dropped_total").increment(1);
                warn!(code = %event.code, "Click queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                metrics::counter!("url_mapper_click_events_dropped_total").increment(1);
                warn!(code = %event.code, "Click queue closed, dropping event");
            }
        }
    }

    /// Best-effort cache write. The TTL never outlives the mapping's expiry.
    async fn populate_cache(&self, mapping: &UrlMapping) {
        let mut ttl = self.settings.cache_ttl;
        if let Some(expires_at) = mapping.expires_at {
            match (expires_at - Utc::now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => ttl = ttl.min(remaining),
                _ => return,
            }
        }

        let key = url_key(&mapping.short_code);
        if let Err(e) = self.cache.set(&key, &mapping.original_url, ttl).await {
            metrics::counter!("url_mapper_cache_errors_total").increment(1);
            warn!(code = %mapping.short_code, error = %e, "Failed to populate cache");
        }
    }
}

/// Runs `begin → add → save_changes → commit` for one new row.
async fn persist(uow: &mut dyn UnitOfWork, new_mapping: NewUrlMapping) -> Result<UrlMapping, AppError> {
    uow.begin_transaction().await.map_err(into_write_error)?;
    uow.add(new_mapping);
    save_and_commit(uow)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::persistence("insert returned no row"))
}

/// Flushes and commits the open transaction, rolling back if the flush fails.
async fn save_and_commit(uow: &mut dyn UnitOfWork) -> Result<Vec<UrlMapping>, AppError> {
    let saved = match uow.save_changes().await {
        Ok(saved) => saved,
        Err(e) => {
            rollback_quietly(uow).await;
            return Err(into_write_error(e));
        }
    };
    uow.commit().await.map_err(into_write_error)?;
    Ok(saved)
}

async fn rollback_quietly(uow: &mut dyn UnitOfWork) {
    if let Err(e) = uow.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

/// Write-path failures surface as `PersistenceFailure`, except code conflicts.
fn into_write_error(e: AppError) -> AppError {
    match e {
        AppError::CodeAlreadyExists { .. } | AppError::PersistenceFailure(_) => e,
        other => AppError::PersistenceFailure(other.to_string()),
    }
}

//! Repository contract for short-code mappings.

use crate::domain::entities::{NewUrlMapping, UrlMapping};
use crate::error::AppError;
use async_trait::async_trait;

/// Data access for [`UrlMapping`] records.
///
/// Reads execute immediately (inside the owning unit of work's transaction when
/// one is active). `add` and `update` only stage changes; they reach the store
/// on [`super::UnitOfWork::save_changes`].
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgUnitOfWork`] - PostgreSQL implementation
/// - [`crate::infrastructure::persistence::InMemoryUnitOfWork`] - In-process store
#[async_trait]
pub trait UrlMappingRepository: Send {
    /// Finds the mapping for a short code.
    ///
    /// Returns the active row when one exists, otherwise the most recently
    /// created inactive row.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistenceFailure`] on store errors.
    async fn find_by_code(&mut self, code: &str) -> Result<Option<UrlMapping>, AppError>;

    /// Finds a mapping by its store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistenceFailure`] on store errors.
    async fn find_by_id(&mut self, id: i64) -> Result<Option<UrlMapping>, AppError>;

    /// Checks whether any row, active or not, uses `code`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistenceFailure`] on store errors.
    async fn exists_by_code(&mut self, code: &str) -> Result<bool, AppError>;

    /// Checks whether an active row uses `code`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistenceFailure`] on store errors.
    async fn exists_active_by_code(&mut self, code: &str) -> Result<bool, AppError>;

    /// Atomically increments the click count of the active mapping for `code`.
    ///
    /// Returns the new count, or `None` if no active mapping uses `code`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistenceFailure`] on store errors.
    async fn increment_click_count(&mut self, code: &str) -> Result<Option<i64>, AppError>;

    /// Stages a new mapping for insertion.
    fn add(&mut self, mapping: NewUrlMapping);

    /// Stages a full-row update of an existing mapping, matched by `id`.
    fn update(&mut self, mapping: UrlMapping);
}

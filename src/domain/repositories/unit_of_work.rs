//! Transaction scope batching repository mutations.

use super::UrlMappingRepository;
use crate::domain::entities::UrlMapping;
use crate::error::AppError;
use async_trait::async_trait;

/// A scope that batches staged mutations into one committed or rolled-back
/// transaction.
///
/// At most one transaction is active per instance. Instances are never shared
/// between concurrent operations: every logical operation obtains its own
/// scope from a [`UnitOfWorkFactory`]. Dropping a scope with an open
/// transaction rolls it back.
#[async_trait]
pub trait UnitOfWork: UrlMappingRepository {
    /// # Errors
    ///
    /// Returns [`AppError::TransactionAlreadyActive`] if a transaction is open.
    async fn begin_transaction(&mut self) -> Result<(), AppError>;

    /// Commits the open transaction. Transaction state is cleared even when
    /// the commit itself fails.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NoActiveTransaction`] if none is open, or
    /// [`AppError::PersistenceFailure`] if the store rejects the commit.
    async fn commit(&mut self) -> Result<(), AppError>;

    /// Rolls back the open transaction and discards staged changes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NoActiveTransaction`] if none is open.
    async fn rollback(&mut self) -> Result<(), AppError>;

    /// Flushes staged changes without closing the transaction.
    ///
    /// Returns the persisted rows in staging order. Without an open
    /// transaction, the flush is applied atomically on its own.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::CodeAlreadyExists`] when an insert or update would
    /// give two active rows the same code, or [`AppError::PersistenceFailure`]
    /// on other store errors.
    async fn save_changes(&mut self) -> Result<Vec<UrlMapping>, AppError>;

    fn has_active_transaction(&self) -> bool;
}

/// Hands out a fresh [`UnitOfWork`] per logical operation.
#[cfg_attr(test, mockall::automock)]
pub trait UnitOfWorkFactory: Send + Sync {
    fn scope(&self) -> Box<dyn UnitOfWork>;
}

//! Repository and unit-of-work implementations.
//!
//! - [`PgUnitOfWork`] - PostgreSQL store via SQLx, one transaction per scope
//! - [`InMemoryUnitOfWork`] - In-process store honoring the same contract
//!
//! Both enforce the filtered uniqueness rule at the store: at most one active
//! row per short code.

pub mod memory_unit_of_work;
pub mod pg_unit_of_work;

pub use memory_unit_of_work::{InMemoryStore, InMemoryUnitOfWork};
pub use pg_unit_of_work::{PgUnitOfWork, PgUnitOfWorkFactory, connect_pool, run_migrations};

use crate::domain::entities::{NewUrlMapping, UrlMapping};

/// A mutation staged by `add`/`update`, written on `save_changes`.
#[derive(Debug, Clone)]
pub(crate) enum PendingChange {
    Add(NewUrlMapping),
    Update(UrlMapping),
}

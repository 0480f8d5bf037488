//! Repository trait definitions for the domain layer.
//!
//! These traits abstract data access following the Repository and Unit of Work
//! patterns. Concrete implementations live in `crate::infrastructure::persistence`.
//!
//! # Available Contracts
//!
//! - [`UrlMappingRepository`] - Short-code mapping reads and staged writes
//! - [`UnitOfWork`] - Transaction scope over a repository
//! - [`UnitOfWorkFactory`] - One scope per logical operation
//!
//! # Uniqueness
//!
//! The store, not the service, is the final authority on short-code uniqueness:
//! a flush that would create a second active row for a code fails with
//! [`crate::error::AppError::CodeAlreadyExists`] even if every pre-check passed.

pub mod unit_of_work;
pub mod url_mapping_repository;

pub use unit_of_work::{UnitOfWork, UnitOfWorkFactory};
pub use url_mapping_repository::UrlMappingRepository;

#[cfg(test)]
pub use unit_of_work::MockUnitOfWorkFactory;

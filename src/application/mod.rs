//! Application layer services implementing business logic.
//!
//! This layer orchestrates domain operations by coordinating the cache, the
//! unit of work and the code generator. Services consume trait objects and
//! expose a small API to whatever boundary hosts them (the bundled CLI today).
//!
//! # Available Services
//!
//! - [`services::mapping_service::MappingService`] - Create, resolve, purge and
//!   deactivate short codes

pub mod dto;
pub mod services;

//! Utility functions for code generation and store error inspection.
//!
//! - [`code_generator`] - Short code generation and validation
//! - [`db_error`] - Recognising uniqueness violations raised by PostgreSQL

pub mod code_generator;
pub mod db_error;

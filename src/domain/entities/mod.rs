//! Core domain entities.
//!
//! - [`UrlMapping`] - A persisted short-code mapping
//! - [`NewUrlMapping`] - Input for creating a mapping; the store assigns ids and timestamps

pub mod url_mapping;

pub use url_mapping::{NewUrlMapping, UrlMapping};

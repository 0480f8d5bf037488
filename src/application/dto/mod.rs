//! Data transfer objects consumed by the application services.

pub mod create_mapping;

pub use create_mapping::CreateMappingRequest;

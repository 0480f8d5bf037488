//! Error taxonomy shared by every layer of the mapping core.
//!
//! The request-handling layer maps each variant to a response through
//! [`AppError::status_code`]; the variants themselves carry no transport details.

use crate::infrastructure::cache::CacheError;
use crate::utils::db_error::is_unique_violation_on_active_code;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A caller passed an argument outside its domain (e.g. a zero code length).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Boundary input failed validation before reaching the store.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Short code already exists: {code}")]
    CodeAlreadyExists { code: String },

    #[error("Failed to generate a unique short code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: usize },

    /// Missing, expired and inactive mappings are deliberately indistinguishable.
    #[error("Short code not found: {code}")]
    NotFound { code: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("A transaction is already active in this unit of work")]
    TransactionAlreadyActive,

    #[error("No active transaction in this unit of work")]
    NoActiveTransaction,

    #[error("Operation timed out after {millis}ms")]
    Timeout { millis: u64 },
}

impl AppError {
    pub fn not_found(code: impl Into<String>) -> Self {
        Self::NotFound { code: code.into() }
    }

    pub fn code_exists(code: impl Into<String>) -> Self {
        Self::CodeAlreadyExists { code: code.into() }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceFailure(message.into())
    }

    /// Stable machine-readable identifier for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Validation(_) => "validation_error",
            Self::CodeAlreadyExists { .. } => "code_already_exists",
            Self::CodeGenerationExhausted { .. } => "code_generation_exhausted",
            Self::NotFound { .. } => "not_found",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::TransactionAlreadyActive => "transaction_already_active",
            Self::NoActiveTransaction => "no_active_transaction",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// HTTP status the request-handling layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) | Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::CodeAlreadyExists { .. } => 409,
            Self::CodeGenerationExhausted { .. } => 422,
            Self::PersistenceFailure(_)
            | Self::TransactionAlreadyActive
            | Self::NoActiveTransaction => 500,
            Self::CacheUnavailable(_) => 503,
            Self::Timeout { .. } => 504,
        }
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        Self::CacheUnavailable(e.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        map_sqlx_error(e, None)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Maps a database error, turning a violation of the active-code index into
/// [`AppError::CodeAlreadyExists`] for `code`.
pub fn map_sqlx_error(e: sqlx::Error, code: Option<&str>) -> AppError {
    if is_unique_violation_on_active_code(&e) {
        return AppError::code_exists(code.unwrap_or_default());
    }

    AppError::PersistenceFailure(e.to_string())
}

//! Short code generation and validation utilities.
//!
//! Provides cryptographically secure random code generation and validation
//! for custom user-provided codes.

use std::sync::LazyLock;

use crate::error::AppError;
use rand::distr::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, TryRngCore};
use regex::Regex;
use validator::ValidationError;

/// Default length of generated codes.
pub const DEFAULT_CODE_LENGTH: usize = 7;

/// Maximum length of any short code, generated or custom.
pub const MAX_CODE_LENGTH: usize = 20;

/// Allowed shape of a user-provided custom code.
pub static CUSTOM_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,20}$").expect("static regex is valid"));

/// Reserved codes that cannot be used as short links.
///
/// These codes are reserved for system endpoints to prevent routing conflicts.
pub const RESERVED_CODES: &[&str] = &["api", "admin", "health", "stats", "purge", "docs"];

/// Source of candidate short codes.
///
/// Implementations hold no uniqueness guarantees; the caller checks the store.
#[cfg_attr(test, mockall::automock)]
pub trait CodeGenerator: Send + Sync {
    /// Produces a candidate code of exactly `length` characters.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidArgument`] when `length` is zero.
    fn generate(&self, length: usize) -> Result<String, AppError>;
}

/// Stateless generator drawing from the 62-character alphanumeric alphabet
/// using the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl RandomCodeGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> Result<String, AppError> {
        if length == 0 {
            return Err(AppError::InvalidArgument(
                "code length must be greater than 0".to_string(),
            ));
        }

        let mut rng = OsRng.unwrap_err();
        let code = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();

        metrics::counter!("url_mapper_codes_generated_total").increment(1);
        Ok(code)
    }
}

/// Rejects reserved words; used as a `validator` custom rule.
pub fn validate_not_reserved(code: &str) -> Result<(), ValidationError> {
    if RESERVED_CODES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(code))
    {
        let mut err = ValidationError::new("reserved_code");
        err.message = Some("This code is reserved".into());
        return Err(err);
    }
    Ok(())
}

//! Boundary input for creating a mapping.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::utils::code_generator::{CUSTOM_CODE_REGEX, validate_not_reserved};

/// Request to create a short code for a URL.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMappingRequest {
    /// The original URL to shorten (must be valid HTTP/HTTPS).
    #[validate(
        url(message = "Invalid URL format"),
        length(max = 2048, message = "URL must be at most 2048 characters"),
        custom(function = "validate_http_scheme")
    )]
    pub original_url: String,

    /// Optional custom short code; generated when absent.
    #[validate(regex(
        path = "*CUSTOM_CODE_REGEX",
        message = "Code must be 3-20 characters of letters, digits, '-' or '_'"
    ))]
    #[validate(custom(function = "validate_not_reserved"))]
    pub custom_code: Option<String>,

    /// Optional expiry. Past this instant the mapping no longer resolves.
    pub expires_at: Option<DateTime<Utc>>,

    #[validate(length(max = 255))]
    pub title: Option<String>,

    pub description: Option<String>,
}

impl CreateMappingRequest {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            ..Self::default()
        }
    }

    pub fn with_custom_code(mut self, code: impl Into<String>) -> Self {
        self.custom_code = Some(code.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn validate_http_scheme(url: &str) -> Result<(), ValidationError> {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(());
    }

    let mut err = ValidationError::new("url_scheme");
    err.message = Some("Only http and https URLs are supported".into());
    Err(err)
}

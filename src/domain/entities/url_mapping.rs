//! Mapping entity between a short code and its original URL.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A persisted short-code mapping.
///
/// `short_code` is unique among active rows only: a deactivated row may share
/// its code with a later active one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UrlMapping {
    pub id: i64,
    pub original_url: String,
    pub short_code: String,
    pub click_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UrlMapping {
    /// Returns true if `expires_at` is set and not after `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A mapping resolves iff it is active and not expired at `now`.
    pub fn is_resolvable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    pub fn is_resolvable(&self) -> bool {
        self.is_resolvable_at(Utc::now())
    }
}

/// Input data for creating a new mapping.
///
/// The store assigns `id`, timestamps, and starts `click_count` at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUrlMapping {
    pub original_url: String,
    pub short_code: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl NewUrlMapping {
    /// Materialises the row the store would create for this input.
    pub fn into_mapping(self, id: i64, now: DateTime<Utc>) -> UrlMapping {
        UrlMapping {
            id,
            original_url: self.original_url,
            short_code: self.short_code,
            click_count: 0,
            expires_at: self.expires_at,
            is_active: true,
            title: self.title,
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mapping(expires_at: Option<DateTime<Utc>>, is_active: bool) -> UrlMapping {
        let mut m = NewUrlMapping {
            original_url: "https://example.com".to_string(),
            short_code: "abc123".to_string(),
            expires_at,
            title: None,
            description: None,
        }
        .into_mapping(1, Utc::now());
        m.is_active = is_active;
        m
    }

    #[test]
    fn test_new_mapping_defaults() {
        let now = Utc::now();
        let m = NewUrlMapping {
            original_url: "https://rust-lang.org".to_string(),
            short_code: "xyz789".to_string(),
            expires_at: None,
            title: Some("Rust".to_string()),
            description: None,
        }
        .into_mapping(42, now);

        assert_eq!(m.id, 42);
        assert_eq!(m.click_count, 0);
        assert!(m.is_active);
        assert_eq!(m.created_at, now);
        assert_eq!(m.updated_at, now);
        assert_eq!(m.title.as_deref(), Some("Rust"));
    }

    #[test]
    fn test_active_without_expiry_is_resolvable() {
        assert!(mapping(None, true).is_resolvable());
    }

    #[test]
    fn test_past_expiry_is_not_resolvable_even_if_active() {
        let m = mapping(Some(Utc::now() - Duration::seconds(1)), true);
        assert!(m.is_expired());
        assert!(!m.is_resolvable());
    }

    #[test]
    fn test_future_expiry_is_resolvable() {
        let m = mapping(Some(Utc::now() + Duration::hours(1)), true);
        assert!(!m.is_expired());
        assert!(m.is_resolvable());
    }

    #[test]
    fn test_inactive_is_not_resolvable() {
        assert!(!mapping(None, false).is_resolvable());
    }

    #[test]
    fn test_resolvability_is_evaluated_against_given_instant() {
        let expiry = Utc::now() + Duration::minutes(5);
        let m = mapping(Some(expiry), true);
        assert!(m.is_resolvable_at(expiry - Duration::seconds(1)));
        assert!(!m.is_resolvable_at(expiry));
    }
}

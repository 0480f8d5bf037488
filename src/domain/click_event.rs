//! Click event model for asynchronous click accounting.

use chrono::{DateTime, Utc};

/// A resolution served from cache whose click still has to reach the store.
///
/// Sent by [`crate::application::services::MappingService::resolve`] on a cache
/// hit and applied by [`crate::domain::click_worker::run_click_worker`], so a
/// hit never waits on a database write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

impl ClickEvent {
    /// Creates a click event stamped with the current time.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            occurred_at: Utc::now(),
        }
    }
}

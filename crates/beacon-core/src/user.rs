//! The `users` resource model and list pagination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// A persisted user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Primary key.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// Body of a create request.
///
/// Missing fields deserialize as empty strings so that [`validate`](Self::validate)
/// can report them with a single message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
}

impl NewUser {
    /// Creates a new user payload.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Checks that both fields are present.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.is_empty() || self.email.is_empty() {
            return Err(AppError::bad_request("name and email are required"));
        }
        Ok(())
    }
}

/// Page size used when none (or an invalid one) is given.
pub const DEFAULT_LIMIT: i64 = 10;

/// Largest page size a caller may request.
pub const MAX_LIMIT: i64 = 100;

/// Normalized `limit`/`page` query parameters.
///
/// # Example
///
/// ```
/// use beacon_core::Pagination;
///
/// let page = Pagination::from_query(Some("500"), Some("0"));
/// assert_eq!(page.limit, 100);
/// assert_eq!(page.page, 1);
/// assert_eq!(page.offset(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Rows per page, in `1..=100`.
    pub limit: i64,
    /// One-based page number.
    pub page: i64,
}

impl Pagination {
    /// Builds pagination from raw query values.
    ///
    /// A missing, unparsable or non-positive limit falls back to 10; larger
    /// than 100 is clamped to 100. A missing, unparsable or non-positive page
    /// becomes 1.
    #[must_use]
    pub fn from_query(limit: Option<&str>, page: Option<&str>) -> Self {
        let limit = limit
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|limit| *limit >= 1)
            .map_or(DEFAULT_LIMIT, |limit| limit.min(MAX_LIMIT));

        let page = page
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map_or(1, |page| page.max(1));

        Self { limit, page }
    }

    /// Row offset for this page.
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            page: 1,
        }
    }
}

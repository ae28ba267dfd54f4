//! Storage and cache error types.

use thiserror::Error;

/// Result alias for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by a [`UserStore`](crate::UserStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The pool could not be created or the first connection failed.
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// A query failed.
    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// An insert collided with a unique constraint.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Schema preparation failed.
    #[error("Failed to run migrations: {0}")]
    Migration(#[source] sqlx::Error),

    /// The store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns true if the error is a unique-constraint collision.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

/// Errors raised by a [`CacheClient`](crate::CacheClient).
#[derive(Debug, Error)]
pub enum CacheError {
    /// The client could not be created or the first `PING` failed.
    #[error("Failed to connect to cache: {0}")]
    Connect(#[source] redis::RedisError),

    /// A command failed.
    #[error("Cache command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// The client was closed or is refusing commands.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

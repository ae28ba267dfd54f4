//! The `users` store seam.

use async_trait::async_trait;
use beacon_core::{NewUser, User};

use crate::error::StorageResult;

/// Persistence for the `users` resource.
///
/// Implemented by [`PgUserStore`](crate::PgUserStore) in production and by
/// [`InMemoryUserStore`](crate::fixtures::InMemoryUserStore) in tests.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Lists users ordered by id.
    async fn list_users(&self, limit: i64, offset: i64) -> StorageResult<Vec<User>>;

    /// Inserts a user and returns the stored row.
    ///
    /// A duplicate email fails with [`StorageError::UniqueViolation`](crate::StorageError::UniqueViolation).
    async fn create_user(&self, new_user: &NewUser) -> StorageResult<User>;

    /// Looks up a user by primary key.
    async fn get_user(&self, id: i32) -> StorageResult<Option<User>>;

    /// Deletes a user. Returns false when no row matched.
    async fn delete_user(&self, id: i32) -> StorageResult<bool>;

    /// Checks that the store answers.
    async fn ping(&self) -> StorageResult<()>;

    /// Prepares the schema.
    async fn migrate(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Releases the store's connections.
    async fn close(&self) {}
}

//! Cache-aside reads of single users.
//!
//! ```text
//! lookup cache ─ hit ──────────────────────────────▶ user
//!      │
//!     miss ─▶ lookup store ─ found ─▶ fill cache ──▶ user
//!                  │
//!              not found ───────────────────────────▶ 404
//! ```
//!
//! Cache failures never reach the caller: a read error or an undecodable entry
//! counts as a miss, a write error is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{AppError, AppResult, TelemetryContext, User};
use opentelemetry::KeyValue;

use crate::cache::{user_key, CacheClient};
use crate::store::UserStore;

/// Name of the child span wrapping each read.
pub const READ_SPAN: &str = "cache.get-user";

/// Cache-aside reader for users.
#[derive(Clone)]
pub struct UserReader {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl UserReader {
    /// Creates a reader that caches entries for `ttl`.
    pub fn new(store: Arc<dyn UserStore>, cache: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Returns the entry time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads user `id`, serving from the cache when possible.
    ///
    /// Fails with 404 `User not found` when the store has no such row, and with
    /// a dependency error when the store lookup itself fails.
    pub async fn get_user(&self, telemetry: &TelemetryContext, id: i32) -> AppResult<User> {
        let span = telemetry.child(READ_SPAN);
        span.set_attribute(KeyValue::new("user.id", i64::from(id)));

        let result = self.read_through(&span, id).await;
        span.end();
        result
    }

    /// Drops the cached entry of user `id`.
    pub async fn invalidate(&self, id: i32) {
        if let Err(e) = self.cache.delete(&user_key(id)).await {
            tracing::warn!(user.id = id, error = %e, "Failed to invalidate cached user");
        }
    }

    async fn read_through(&self, span: &TelemetryContext, id: i32) -> AppResult<User> {
        let key = user_key(id);

        if let Some(user) = self.lookup_cache(&key).await {
            span.set_attribute(KeyValue::new("cache.hit", true));
            tracing::info!(user.id = id, "Cache hit");
            return Ok(user);
        }

        span.set_attribute(KeyValue::new("cache.hit", false));
        tracing::info!(user.id = id, "Cache miss");

        let user = self
            .store
            .get_user(id)
            .await
            .map_err(|e| {
                tracing::warn!(user.id = id, error = %e, "Failed to query user");
                AppError::dependency("Failed to fetch user", e)
            })?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        self.fill(&key, &user).await;
        Ok(user)
    }

    async fn lookup_cache(&self, key: &str) -> Option<User> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to unmarshal cached user");
                None
            }
        }
    }

    async fn fill(&self, key: &str, user: &User) {
        let raw = match serde_json::to_string(user) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to marshal user for cache");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, &raw, self.ttl).await {
            tracing::warn!(key, error = %e, "Failed to cache user");
        }
    }
}

impl std::fmt::Debug for UserReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserReader")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

//! Shared handler state.

use std::sync::Arc;
use std::time::Duration;

use beacon_storage::{CacheClient, UserReader, UserStore};

use crate::context::AppContext;

/// What the route handlers need, taken from the [`AppContext`] once startup is done.
pub struct ApiState {
    /// Reported by `GET /`.
    pub service_name: String,
    /// Reported by `GET /`.
    pub service_version: String,
    /// The user store.
    pub store: Arc<dyn UserStore>,
    /// The cache client.
    pub cache: Arc<dyn CacheClient>,
    /// Cache-aside reads over `store` and `cache`.
    pub reader: UserReader,
}

impl ApiState {
    /// Creates handler state over a store and a cache.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        store: Arc<dyn UserStore>,
        cache: Arc<dyn CacheClient>,
        user_ttl: Duration,
    ) -> Self {
        let reader = UserReader::new(Arc::clone(&store), Arc::clone(&cache), user_ttl);
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            store,
            cache,
            reader,
        }
    }

    /// Builds handler state from a started context.
    ///
    /// Returns `None` if the store or cache step has not run.
    #[must_use]
    pub fn from_context(ctx: &AppContext) -> Option<Self> {
        let store = Arc::clone(ctx.store.as_ref()?);
        let cache = Arc::clone(ctx.cache.as_ref()?);
        Some(Self::new(
            ctx.config.telemetry.service_name.clone(),
            ctx.config.telemetry.service_version.clone(),
            store,
            cache,
            ctx.config.cache.user_ttl,
        ))
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("service_name", &self.service_name)
            .field("service_version", &self.service_version)
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

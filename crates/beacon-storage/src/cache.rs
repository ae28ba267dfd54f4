//! Key/value cache seam and its Redis implementation.

use std::time::Duration;

use async_trait::async_trait;
use beacon_config::RedisConfig;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{CacheError, CacheResult};

/// Key prefix of cached users.
pub const USER_KEY_PREFIX: &str = "user:";

/// Returns the cache key of user `id`.
#[must_use]
pub fn user_key(id: i32) -> String {
    format!("{USER_KEY_PREFIX}{id}")
}

/// A string key/value cache with per-entry expiry.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    /// Reads `key`. A missing or expired entry is `Ok(None)`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Writes `key` with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Checks that the cache answers.
    async fn ping(&self) -> CacheResult<()>;

    /// Closes the client. Later commands fail with [`CacheError::Unavailable`].
    async fn close(&self) -> CacheResult<()>;
}

/// Redis cache over a multiplexed, auto-reconnecting connection.
pub struct RedisCache {
    addr: String,
    manager: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    /// Connects to `config.url` and verifies the server with `PING`.
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(CacheError::Connect)?;
        let addr = client.get_connection_info().addr.to_string();
        let manager = ConnectionManager::new(client)
            .await
            .map_err(CacheError::Connect)?;

        let cache = Self {
            addr,
            manager: RwLock::new(Some(manager)),
        };
        cache.ping().await?;

        tracing::info!(addr = %cache.addr, "Redis initialized");
        Ok(cache)
    }

    /// Returns the server address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn connection(&self) -> CacheResult<ConnectionManager> {
        self.manager
            .read()
            .clone()
            .ok_or_else(|| CacheError::Unavailable("client closed".to_string()))
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("addr", &self.addr)
            .field("open", &self.manager.read().is_some())
            .finish()
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        if self.manager.write().take().is_some() {
            tracing::info!(addr = %self.addr, "Redis connection closed");
        }
        Ok(())
    }
}

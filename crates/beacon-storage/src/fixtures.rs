//! In-memory store and cache for tests and local runs.
//!
//! Both types count their calls and can be told to fail, so that callers can
//! assert cache-aside behavior and error handling without a database or Redis.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{NewUser, User};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::cache::CacheClient;
use crate::error::{CacheError, CacheResult, StorageError, StorageResult};
use crate::store::UserStore;

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i32, User>,
    last_id: i32,
}

/// A [`UserStore`] over a `BTreeMap`.
///
/// # Example
///
/// ```
/// use beacon_core::NewUser;
/// use beacon_storage::fixtures::InMemoryUserStore;
/// use beacon_storage::UserStore;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryUserStore::new();
/// let user = store.create_user(&NewUser::new("Ada", "ada@example.com")).await.unwrap();
/// assert_eq!(store.get_user(user.id).await.unwrap(), Some(user));
/// assert_eq!(store.query_count(), 2);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    table: Mutex<Table>,
    queries: AtomicUsize,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of operations served, pings excluded.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of primary-key lookups served.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Makes every later operation fail with [`StorageError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.table.lock().rows.len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("connection refused".to_string()));
        }
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn list_users(&self, limit: i64, offset: i64) -> StorageResult<Vec<User>> {
        self.begin()?;
        let skip = usize::try_from(offset).unwrap_or(0);
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .table
            .lock()
            .rows
            .values()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn create_user(&self, new_user: &NewUser) -> StorageResult<User> {
        self.begin()?;
        let mut table = self.table.lock();
        if table.rows.values().any(|u| u.email == new_user.email) {
            return Err(StorageError::UniqueViolation("users_email_key".to_string()));
        }

        table.last_id += 1;
        let user = User {
            id: table.last_id,
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            created_at: Utc::now(),
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i32) -> StorageResult<Option<User>> {
        self.begin()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.lock().rows.get(&id).cloned())
    }

    async fn delete_user(&self, id: i32) -> StorageResult<bool> {
        self.begin()?;
        Ok(self.table.lock().rows.remove(&id).is_some())
    }

    async fn ping(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

/// A [`CacheClient`] over a `DashMap` with expiring entries.
///
/// Expiry follows the tokio clock, so tests can move time with
/// `tokio::time::advance` under a paused runtime.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `get` fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes `set` and `delete` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stores `value` under `key` for an hour, bypassing failure injection.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(
            key.into(),
            (value.into(), Instant::now() + Duration::from_secs(3600)),
        );
    }

    /// Returns true if `key` holds a live entry.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.1 > Instant::now())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|entry| entry.1 > now).count()
    }

    /// Returns true if no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> CacheResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("client closed".to_string()));
        }
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("{op} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check(&self.fail_reads, "read")?;
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone());
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.1 <= now);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check(&self.fail_writes, "write")?;
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check(&self.fail_writes, "write")?;
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check(&self.fail_reads, "ping")
    }

    async fn close(&self) -> CacheResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

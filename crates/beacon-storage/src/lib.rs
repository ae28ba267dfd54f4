//! # Beacon Storage
//!
//! Persistence and caching for the `users` resource.
//!
//! - [`UserStore`] / [`PgUserStore`] - PostgreSQL pool, queries, schema preparation
//! - [`CacheClient`] / [`RedisCache`] - Redis key/value cache with expiry
//! - [`UserReader`] - Cache-aside reads of single users
//! - [`fixtures`] - In-memory store and cache with counters and failure injection

#![doc(html_root_url = "https://docs.rs/beacon-storage/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cache;
mod error;
pub mod fixtures;
mod postgres;
mod reader;
mod store;

pub use cache::{user_key, CacheClient, RedisCache, USER_KEY_PREFIX};
pub use error::{CacheError, CacheResult, StorageError, StorageResult};
pub use postgres::{PgUserStore, USERS_SCHEMA};
pub use reader::{UserReader, READ_SPAN};
pub use store::UserStore;

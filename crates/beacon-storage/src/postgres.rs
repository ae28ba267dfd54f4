//! PostgreSQL-backed [`UserStore`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use beacon_config::DatabaseConfig;
use beacon_core::{NewUser, User};
use parking_lot::Mutex;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio::task::JoinHandle;

use crate::error::{StorageError, StorageResult};
use crate::store::UserStore;

/// Schema of the `users` table.
pub const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// How long pool creation may wait for a connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// A pooled PostgreSQL store.
///
/// The pool is cheap to clone and shared by every request.
#[derive(Debug)]
pub struct PgUserStore {
    pool: PgPool,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl PgUserStore {
    /// Creates the pool described by `config` and verifies one connection.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let options = PgConnectOptions::from_str(&config.url).map_err(StorageError::Connect)?;
        let host = options.get_host().to_string();
        let port = options.get_port();
        let database = options.get_database().unwrap_or_default().to_string();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StorageError::Connect)?;

        tracing::info!(
            host = %host,
            port,
            database = %database,
            max_conns = config.max_connections,
            min_conns = config.min_connections,
            "PostgreSQL connection pool initialized"
        );

        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            health_task: Mutex::new(None),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Starts probing the pool every `interval` in the background.
    ///
    /// A previous probe, if any, is replaced. The probe stops on [`close`](UserStore::close).
    pub fn start_health_check(&self, interval: Duration) {
        let pool = self.pool.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match sqlx::query("SELECT 1").execute(&pool).await {
                    Ok(_) => tracing::debug!(
                        size = pool.size(),
                        idle = pool.num_idle(),
                        "Database health check passed"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Database health check failed"),
                }
            }
        });

        if let Some(previous) = self.health_task.lock().replace(handle) {
            previous.abort();
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list_users(&self, limit: i64, offset: i64) -> StorageResult<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, created_at
            FROM users
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(row_to_user)
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)
    }

    async fn create_user(&self, new_user: &NewUser) -> StorageResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (name, email)
            VALUES ($1, $2)
            RETURNING id, name, email, created_at
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row_to_user(&row)?)
    }

    async fn get_user(&self, id: i32) -> StorageResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_user).transpose()?)
    }

    async fn delete_user(&self, id: i32) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migrate(&self) -> StorageResult<()> {
        sqlx::query(USERS_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Migration)?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn close(&self) {
        if let Some(task) = self.health_task.lock().take() {
            task.abort();
        }
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

fn row_to_user(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

fn classify(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::UniqueViolation(db.constraint().unwrap_or("users_email_key").to_string())
        }
        _ => StorageError::Query(err),
    }
}

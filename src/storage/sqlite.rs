use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use super::KvStore;
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed key-value store.
///
/// Expiry is stored as unix seconds and enforced on read; expired rows are
/// deleted when they are next touched.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Unavailable {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Unavailable {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// In-memory database on a single connection, for tests
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Unavailable {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // Every pooled connection would otherwise see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn delete_if_expired(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ? AND expires_at IS NOT NULL AND expires_at <= ?")
            .bind(key)
            .bind(now_secs())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

fn is_live(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.map_or(true, |at| at > now)
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let row = sqlx::query("SELECT value, expires_at FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: Option<i64> = row.get("expires_at");
        if !is_live(expires_at, now_secs()) {
            self.delete_if_expired(key).await?;
            return Ok(None);
        }

        Ok(Some(row.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> StorageResult<()> {
        let expires_at = (ttl_seconds > 0).then(|| now_secs() + ttl_seconds as i64);

        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn del(&self, key: &str) -> StorageResult<bool> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;

        // Remove an expired row too, but it does not count as deleted
        self.delete_if_expired(key).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ttl(&self, key: &str) -> StorageResult<Option<u64>> {
        let expires_at: Option<Option<i64>> =
            sqlx::query_scalar("SELECT expires_at FROM kv_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let now = now_secs();
        Ok(match expires_at {
            Some(Some(at)) if at > now => Some((at - now) as u64),
            _ => None,
        })
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

//! SQLite-backed cache store.
//!
//! Entries survive process restarts and can be shared by several
//! processes on one host. Expiry is checked on read against the stored
//! `expires_at` (milliseconds since the epoch); expired rows are deleted
//! lazily and by [`SqliteCache::purge_expired`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use voltwise_core::CacheStore;
use voltwise_core::error::CacheError;

pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`.
    pub async fn new(path: &str) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| CacheError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let cache = Self { pool };
        cache.run_migrations().await?;
        info!("SQLite cache initialized at {path}");
        Ok(cache)
    }

    async fn run_migrations(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key          TEXT PRIMARY KEY NOT NULL,
                value        TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                ttl_seconds  INTEGER NOT NULL,
                expires_at   INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Storage(format!("cache_entries table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache_entries(expires_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Storage(format!("expires_at index: {e}")))?;

        Ok(())
    }

    /// Delete every expired row. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row = sqlx::query("SELECT value, expires_at FROM cache_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: i64 = row.get("expires_at");
        if Utc::now().timestamp_millis() >= expires_at {
            debug!(key, "Dropping expired cache row");
            self.invalidate(key).await?;
            return Ok(None);
        }

        Ok(Some(row.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let now = Utc::now();
        let ttl_ms = (ttl_seconds as i64).saturating_mul(1000);
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, created_at, ttl_seconds, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                ttl_seconds = excluded.ttl_seconds,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now.to_rfc3339())
        .bind(ttl_seconds as i64)
        .bind(now.timestamp_millis().saturating_add(ttl_ms))
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        self.purge_expired().await?;
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_cache(dir: &tempfile::TempDir) -> SqliteCache {
        let path = dir.path().join("cache.db");
        SqliteCache::new(&format!("sqlite://{}", path.display())).await.unwrap()
    }

    #[tokio::test]
    async fn set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        cache.set("k", "{\"total_tokens\":12}", 60).await.unwrap();
        assert_eq!(
            cache.get("k").await.unwrap().as_deref(),
            Some("{\"total_tokens\":12}")
        );
    }

    #[tokio::test]
    async fn upsert_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        cache.set("k", "old", 60).await.unwrap();
        cache.set("k", "new", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn zero_ttl_is_never_served() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        cache.set("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.invalidate("k").await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_expired_rows_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        cache.set("stale", "v", 0).await.unwrap();
        cache.set("fresh", "v", 600).await.unwrap();
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert!(cache.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_empties_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        cache.set("stale", "v", 0).await.unwrap();
        cache.set("a", "v", 600).await.unwrap();
        cache.set("b", "v", 600).await.unwrap();

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        test_cache(&dir).await.set("k", "v", 600).await.unwrap();
        let reopened = test_cache(&dir).await;
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
    }
}

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::baseline::Baseline;
use crate::error::Result;

/// Durable home for frozen baselines, one per monitored target.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Replace the stored baseline of `target`.
    async fn save(&self, target: &str, baseline: &Baseline) -> Result<()>;

    async fn load(&self, target: &str) -> Result<Option<Baseline>>;
}

/// SQLite-backed [`BaselineStore`]. The baseline is kept as a JSON payload.
#[derive(Clone)]
pub struct SqliteBaselineStore {
    pool: SqlitePool,
}

impl SqliteBaselineStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database lives and dies with its single connection
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS drift_baselines (
                target TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                sample_size INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl BaselineStore for SqliteBaselineStore {
    async fn save(&self, target: &str, baseline: &Baseline) -> Result<()> {
        let payload = serde_json::to_string(baseline)?;
        sqlx::query(
            "INSERT INTO drift_baselines (target, created_at, sample_size, payload)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(target) DO UPDATE SET
                created_at = excluded.created_at,
                sample_size = excluded.sample_size,
                payload = excluded.payload,
                updated_at = datetime('now')",
        )
        .bind(target)
        .bind(baseline.created_at.to_rfc3339())
        .bind(baseline.sample_size as i64)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        info!(target_name = %target, sample_size = baseline.sample_size, "Baseline persisted");
        Ok(())
    }

    async fn load(&self, target: &str) -> Result<Option<Baseline>> {
        let row = sqlx::query("SELECT payload FROM drift_baselines WHERE target = ?")
            .bind(target)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }
}

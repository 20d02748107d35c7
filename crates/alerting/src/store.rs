use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::debug;

use crate::error::StoreError;
use crate::state::AlertState;

/// Persists [`AlertState`] between runs, one record per pipeline.
#[async_trait]
pub trait AlertStateStore: Send + Sync {
    async fn save(&self, pipeline: &str, state: &AlertState) -> Result<(), StoreError>;

    /// Missing state loads as empty.
    async fn load(&self, pipeline: &str) -> Result<AlertState, StoreError>;
}

#[derive(Clone)]
pub struct SqliteAlertStateStore {
    pool: SqlitePool,
}

impl SqliteAlertStateStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS alert_state (
                pipeline TEXT PRIMARY KEY,
                active_count INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl AlertStateStore for SqliteAlertStateStore {
    async fn save(&self, pipeline: &str, state: &AlertState) -> Result<(), StoreError> {
        let payload = serde_json::to_string(state)?;
        sqlx::query(
            "INSERT INTO alert_state (pipeline, active_count, payload)
             VALUES (?, ?, ?)
             ON CONFLICT(pipeline) DO UPDATE SET
                active_count = excluded.active_count,
                payload = excluded.payload,
                updated_at = datetime('now')",
        )
        .bind(pipeline)
        .bind(state.len() as i64)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        debug!(pipeline, active = state.len(), "Alert state saved");
        Ok(())
    }

    async fn load(&self, pipeline: &str) -> Result<AlertState, StoreError> {
        let row = sqlx::query("SELECT payload FROM alert_state WHERE pipeline = ?")
            .bind(pipeline)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                Ok(serde_json::from_str(&payload)?)
            }
            None => Ok(AlertState::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{AlertCondition, ComparisonOperator};
    use crate::engine::AlertConditionEngine;
    use crate::rule::{AlertRule, RuleSet, Severity};
    use eval_core::MetricsSnapshot;

    fn firing_engine() -> AlertConditionEngine {
        let rule = AlertRule::new(
            "weak-ic",
            AlertCondition::simple("ic.pearson", ComparisonOperator::Lt, 0.05),
            Severity::Warning,
        )
        .with_cooldown(600);
        let mut engine = AlertConditionEngine::new(RuleSet::new(vec![rule]).unwrap());
        engine.evaluate_all(&MetricsSnapshot::new().with("ic.pearson", f64::NAN));
        engine.evaluate_all(&MetricsSnapshot::new().with("ic.pearson", 0.0));
        engine
    }

    #[tokio::test]
    async fn test_missing_pipeline_loads_empty() {
        let store = SqliteAlertStateStore::connect("sqlite::memory:").await.unwrap();
        assert!(store.load("nightly").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqliteAlertStateStore::connect("sqlite::memory:").await.unwrap();
        let engine = firing_engine();
        assert_eq!(engine.state().len(), 1);

        store.save("nightly", engine.state()).await.unwrap();
        let loaded = store.load("nightly").await.unwrap();
        assert_eq!(&loaded, engine.state());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = SqliteAlertStateStore::connect("sqlite::memory:").await.unwrap();
        store.save("nightly", firing_engine().state()).await.unwrap();
        store.save("nightly", &AlertState::default()).await.unwrap();
        assert!(store.load("nightly").await.unwrap().is_empty());
    }
}

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::Result;
use crate::retry::RetryPolicy;

/// Handle to the signal journal. Cheap to clone.
#[derive(Clone)]
pub struct JournalDb {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl JournalDb {
    /// Open (creating if missing) the database at `database_url` and apply the schema
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // each in-memory connection is a separate database, so pin exactly one
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Self::from_pool(pool).await
    }

    /// Single-connection in-memory journal
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Wrap an existing pool. The schema is applied idempotently.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let db = Self {
            pool,
            retry: RetryPolicy::default(),
        };
        db.init_schema().await?;
        Ok(db)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn init_schema(&self) -> Result<()> {
        let schema = include_str!("../../../schema.sql");

        // sqlx executes one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        tracing::debug!("Journal schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_db_creation() {
        let db = JournalDb::in_memory().await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let db = JournalDb::in_memory().await.unwrap();
        db.init_schema().await.unwrap();

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('market_snapshots', 'trade_plans', 'trade_outcomes', 'learning_logs', 'evaluator_configs')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, 5);
    }
}

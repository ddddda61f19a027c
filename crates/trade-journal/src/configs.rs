use chrono::{DateTime, Utc};
use serde::Serialize;
use setup_evaluator::EvaluatorConfig;
use signal_core::ValidationError;
use sqlx::FromRow;

use crate::db::JournalDb;
use crate::error::{JournalError, Result};
use crate::rows::{format_ts, parse_ts};

/// One persisted evaluator configuration version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigVersion {
    pub version: i64,
    pub created_at: DateTime<Utc>,
    /// Review whose action items produced this version. None for the seed.
    pub source_review_id: Option<i64>,
    pub config: EvaluatorConfig,
}

#[derive(Debug, FromRow)]
struct ConfigRow {
    version: i64,
    created_at: String,
    source_review_id: Option<i64>,
    config_json: String,
}

impl ConfigRow {
    fn into_version(self) -> Result<ConfigVersion> {
        let mut config: EvaluatorConfig = serde_json::from_str(&self.config_json)?;
        config.version = self.version;
        Ok(ConfigVersion {
            version: self.version,
            created_at: parse_ts("created_at", &self.created_at)?,
            source_review_id: self.source_review_id,
            config,
        })
    }
}

impl JournalDb {
    /// Highest configuration version, if any has been stored
    pub async fn active_config(&self) -> Result<Option<ConfigVersion>> {
        let row = sqlx::query_as::<_, ConfigRow>(
            "SELECT * FROM evaluator_configs ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?;

        row.map(ConfigRow::into_version).transpose()
    }

    pub async fn get_config(&self, version: i64) -> Result<Option<ConfigVersion>> {
        let row = sqlx::query_as::<_, ConfigRow>("SELECT * FROM evaluator_configs WHERE version = ?")
            .bind(version)
            .fetch_optional(self.pool())
            .await?;

        row.map(ConfigRow::into_version).transpose()
    }

    pub async fn list_configs(&self) -> Result<Vec<ConfigVersion>> {
        let rows = sqlx::query_as::<_, ConfigRow>("SELECT * FROM evaluator_configs ORDER BY version")
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(ConfigRow::into_version).collect()
    }

    /// Store `config` as version 1 unless a version already exists, then
    /// return the active version.
    pub async fn seed_config(&self, config: &EvaluatorConfig) -> Result<ConfigVersion> {
        if let Some(active) = self.active_config().await? {
            return Ok(active);
        }

        let mut seed = config.clone();
        seed.version = 1;
        let json = serde_json::to_string(&seed)?;
        let created_at = Utc::now();

        sqlx::query(
            "INSERT OR IGNORE INTO evaluator_configs (version, created_at, source_review_id, config_json) \
             VALUES (1, ?, NULL, ?)",
        )
        .bind(format_ts(&created_at))
        .bind(&json)
        .execute(self.pool())
        .await?;

        tracing::info!("Seeded evaluator configuration version 1");

        self.active_config().await?.ok_or_else(|| {
            ValidationError::InvalidData("configuration seed was not stored".into()).into()
        })
    }

    /// Persist the successor of the active version. `config.version` must be
    /// exactly one above the current highest version.
    pub async fn insert_config_version(
        &self,
        config: &EvaluatorConfig,
        source_review_id: i64,
    ) -> Result<ConfigVersion> {
        let json = serde_json::to_string(config)?;
        let created_at = Utc::now();
        let json = &json;

        self.retry()
            .run("insert_config_version", move || async move {
                let mut tx = self.pool().begin().await?;

                let (current,): (i64,) =
                    sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM evaluator_configs")
                        .fetch_one(&mut *tx)
                        .await?;
                if config.version != current + 1 {
                    return Err(JournalError::Validation(ValidationError::InvalidData(format!(
                        "configuration version {} does not follow {}",
                        config.version, current
                    ))));
                }

                let review: Option<(i64,)> = sqlx::query_as("SELECT id FROM learning_logs WHERE id = ?")
                    .bind(source_review_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                if review.is_none() {
                    return Err(JournalError::ReviewNotFound(source_review_id));
                }

                sqlx::query(
                    "INSERT INTO evaluator_configs (version, created_at, source_review_id, config_json) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(config.version)
                .bind(format_ts(&created_at))
                .bind(source_review_id)
                .bind(json)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<_, JournalError>(())
            })
            .await?;

        tracing::debug!(
            version = config.version,
            source_review_id,
            "Stored evaluator configuration version"
        );

        Ok(ConfigVersion {
            version: config.version,
            created_at,
            source_review_id: Some(source_review_id),
            config: config.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;
    use signal_core::LearningReview;

    fn empty_review() -> LearningReview {
        let now = Utc::now();
        LearningReview {
            id: None,
            review_date: now,
            window_start: now,
            window_end: now,
            sample_size: 0,
            low_confidence: true,
            high_performing_conditions: vec![],
            loss_prone_conditions: vec![],
            strongest_filters: vec![],
            regime_notes: String::new(),
            action_items: vec![],
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = setup_test_db().await;
        let mut other = EvaluatorConfig::default();
        other.min_probability_score = 90.0;

        // already seeded with defaults
        let active = db.seed_config(&other).await.unwrap();
        assert_eq!(active.version, 1);
        assert_eq!(active.config.min_probability_score, 70.0);
        assert_eq!(db.list_configs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_successor_version_records_review() {
        let db = setup_test_db().await;
        let review_id = db.append_review(&empty_review()).await.unwrap();

        let active = db.active_config().await.unwrap().unwrap();
        let mut next = active.config.clone();
        next.version = 2;
        next.min_probability_score = 75.0;

        db.insert_config_version(&next, review_id).await.unwrap();

        let active = db.active_config().await.unwrap().unwrap();
        assert_eq!(active.version, 2);
        assert_eq!(active.source_review_id, Some(review_id));
        assert_eq!(active.config.min_probability_score, 75.0);
        assert!(db.get_config(1).await.unwrap().unwrap().source_review_id.is_none());
    }

    #[tokio::test]
    async fn test_version_gap_rejected() {
        let db = setup_test_db().await;
        let review_id = db.append_review(&empty_review()).await.unwrap();
        let mut next = EvaluatorConfig::default();
        next.version = 5;
        assert!(db.insert_config_version(&next, review_id).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_review_rejected() {
        let db = setup_test_db().await;
        let mut next = EvaluatorConfig::default();
        next.version = 2;
        let err = db.insert_config_version(&next, 31).await.unwrap_err();
        assert!(matches!(err, JournalError::ReviewNotFound(31)));
    }
}

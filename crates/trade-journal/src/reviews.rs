use chrono::{DateTime, Utc};
use signal_core::{ClosedTrade, LearningReview};

use crate::db::JournalDb;
use crate::error::{JournalError, Result};
use crate::rows::{format_ts, ClosedTradeRow, ReviewRow};

const WINDOW_SAMPLE_SQL: &str = r#"
    SELECT
        s.id AS s_id, s.timestamp AS s_timestamp, s.session AS s_session,
        s.htf_trend AS s_htf_trend, s.htf_structure AS s_htf_structure,
        s.key_resistance_level AS s_key_resistance_level,
        s.liquidity_event_type AS s_liquidity_event_type,
        s.has_large_wick AS s_has_large_wick,
        s.consecutive_bullish_candles AS s_consecutive_bullish_candles,
        s.atr_value AS s_atr_value, s.rsi_divergence AS s_rsi_divergence,
        s.vwap_distance AS s_vwap_distance, s.volume_spike AS s_volume_spike,
        s.spread_value AS s_spread_value,
        s.news_event_proximity_minutes AS s_news_event_proximity_minutes,
        p.id AS p_id, p.created_at AS p_created_at, p.direction AS p_direction,
        p.entry_zone_start AS p_entry_zone_start, p.entry_zone_end AS p_entry_zone_end,
        p.stop_loss AS p_stop_loss, p.tp1 AS p_tp1, p.tp2 AS p_tp2,
        p.estimated_rr AS p_estimated_rr, p.probability_score AS p_probability_score,
        p.status AS p_status, p.config_version AS p_config_version,
        o.id AS o_id, o.entry_price AS o_entry_price, o.exit_price AS o_exit_price,
        o.outcome AS o_outcome, o.realized_r_multiple AS o_realized_r_multiple,
        o.pnl_percent AS o_pnl_percent, o.comments AS o_comments,
        o.recorded_at AS o_recorded_at
    FROM trade_outcomes o
    JOIN trade_plans p ON p.id = o.plan_id
    JOIN market_snapshots s ON s.id = p.snapshot_id
    WHERE s.timestamp >= ? AND s.timestamp <= ?
    ORDER BY s.timestamp, o.id
"#;

impl JournalDb {
    /// All outcomes whose originating snapshot lies in `[start, end]`, read in
    /// one statement.
    pub async fn window_sample(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClosedTrade>> {
        let rows = self
            .retry()
            .run("window_sample", move || async move {
                sqlx::query_as::<_, ClosedTradeRow>(WINDOW_SAMPLE_SQL)
                    .bind(format_ts(&start))
                    .bind(format_ts(&end))
                    .fetch_all(self.pool())
                    .await
                    .map_err(JournalError::from)
            })
            .await?;

        rows.into_iter()
            .map(ClosedTradeRow::into_closed_trade)
            .collect()
    }

    /// Append a review. Reviews are never updated.
    pub async fn append_review(&self, review: &LearningReview) -> Result<i64> {
        let high = serde_json::to_string(&review.high_performing_conditions)?;
        let loss = serde_json::to_string(&review.loss_prone_conditions)?;
        let filters = serde_json::to_string(&review.strongest_filters)?;
        let actions = serde_json::to_string(&review.action_items)?;

        let (high, loss, filters, actions) = (&high, &loss, &filters, &actions);
        let id = self
            .retry()
            .run("append_review", move || async move {
                let result = sqlx::query(
                    r#"
                    INSERT INTO learning_logs (
                        review_date, window_start, window_end, sample_size, low_confidence,
                        high_performing_conditions, loss_prone_conditions, strongest_filters,
                        regime_notes, action_items
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(format_ts(&review.review_date))
                .bind(format_ts(&review.window_start))
                .bind(format_ts(&review.window_end))
                .bind(review.sample_size as i64)
                .bind(review.low_confidence)
                .bind(high)
                .bind(loss)
                .bind(filters)
                .bind(&review.regime_notes)
                .bind(actions)
                .execute(self.pool())
                .await?;
                Ok::<_, JournalError>(result.last_insert_rowid())
            })
            .await?;

        tracing::info!(
            review_id = id,
            sample_size = review.sample_size,
            low_confidence = review.low_confidence,
            action_items = review.action_items.len(),
            "Learning review stored"
        );
        Ok(id)
    }

    pub async fn get_review(&self, id: i64) -> Result<Option<LearningReview>> {
        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM learning_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(ReviewRow::into_review).transpose()
    }

    pub async fn list_reviews(&self, limit: i64) -> Result<Vec<LearningReview>> {
        let rows = sqlx::query_as::<_, ReviewRow>("SELECT * FROM learning_logs ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(ReviewRow::into_review).collect()
    }
}

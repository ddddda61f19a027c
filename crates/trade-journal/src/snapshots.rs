use chrono::{Duration, NaiveTime};
use signal_core::{MarketSnapshot, TradePlan};
use sqlx::SqliteConnection;

use crate::db::JournalDb;
use crate::error::Result;
use crate::plans::insert_plan;
use crate::rows::{format_ts, SnapshotRow};

/// Ids written by one evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleRecord {
    pub snapshot_id: i64,
    pub plan_id: Option<i64>,
    /// Plans already stored for the plan's day when the daily cap held it back
    pub capped_at: Option<i64>,
}

pub(crate) async fn insert_snapshot(
    conn: &mut SqliteConnection,
    snapshot: &MarketSnapshot,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO market_snapshots (
            timestamp, session, htf_trend, htf_structure, key_resistance_level,
            liquidity_event_type, has_large_wick, consecutive_bullish_candles,
            atr_value, rsi_divergence, vwap_distance, volume_spike, spread_value,
            news_event_proximity_minutes
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(format_ts(&snapshot.timestamp))
    .bind(snapshot.session.as_str())
    .bind(snapshot.htf_trend.as_str())
    .bind(&snapshot.htf_structure)
    .bind(snapshot.key_resistance_level)
    .bind(snapshot.liquidity_event_type.as_str())
    .bind(snapshot.has_large_wick)
    .bind(snapshot.consecutive_bullish_candles as i64)
    .bind(snapshot.atr_value)
    .bind(snapshot.rsi_divergence)
    .bind(snapshot.vwap_distance)
    .bind(snapshot.volume_spike)
    .bind(snapshot.spread_value)
    .bind(snapshot.news_event_proximity_minutes)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Plans created on the UTC day of `plan.created_at`
async fn plans_on_day(conn: &mut SqliteConnection, plan: &TradePlan) -> Result<i64> {
    let day_start = plan.created_at.date_naive().and_time(NaiveTime::MIN).and_utc();
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM trade_plans WHERE created_at >= ? AND created_at < ?",
    )
    .bind(format_ts(&day_start))
    .bind(format_ts(&(day_start + Duration::days(1))))
    .fetch_one(conn)
    .await?;
    Ok(count)
}

impl JournalDb {
    /// Append a validated snapshot on its own
    pub async fn record_snapshot(&self, snapshot: &MarketSnapshot) -> Result<i64> {
        self.record_cycle(snapshot, None)
            .await
            .map(|record| record.snapshot_id)
    }

    /// Persist a snapshot and, when the evaluator produced one, its plan in a
    /// single transaction. The plan's `snapshot_id` is overwritten with the
    /// new snapshot id.
    pub async fn record_cycle(
        &self,
        snapshot: &MarketSnapshot,
        plan: Option<&TradePlan>,
    ) -> Result<CycleRecord> {
        self.retry()
            .run("record_cycle", move || self.try_record_cycle(snapshot, plan, None))
            .await
    }

    /// Like `record_cycle`, but the plan is only inserted while fewer than
    /// `daily_cap` plans exist for the UTC day of its `created_at`. The count
    /// runs after the snapshot insert inside the same transaction, so it holds
    /// the write lock and concurrent cycles cannot both squeeze under the cap.
    /// A held-back plan still commits the snapshot.
    pub async fn record_cycle_capped(
        &self,
        snapshot: &MarketSnapshot,
        plan: &TradePlan,
        daily_cap: i64,
    ) -> Result<CycleRecord> {
        self.retry()
            .run("record_cycle", move || {
                self.try_record_cycle(snapshot, Some(plan), Some(daily_cap))
            })
            .await
    }

    async fn try_record_cycle(
        &self,
        snapshot: &MarketSnapshot,
        plan: Option<&TradePlan>,
        daily_cap: Option<i64>,
    ) -> Result<CycleRecord> {
        let mut tx = self.pool().begin().await?;

        let snapshot_id = insert_snapshot(&mut *tx, snapshot).await?;
        let mut capped_at = None;
        let plan_id = match plan {
            Some(plan) => {
                let created = match daily_cap {
                    Some(_) => Some(plans_on_day(&mut *tx, plan).await?),
                    None => None,
                };
                match (created, daily_cap) {
                    (Some(created), Some(cap)) if created >= cap => {
                        capped_at = Some(created);
                        None
                    }
                    _ => Some(insert_plan(&mut *tx, snapshot_id, plan).await?),
                }
            }
            None => None,
        };

        tx.commit().await?;

        tracing::debug!(snapshot_id, ?plan_id, ?capped_at, "Cycle recorded");
        Ok(CycleRecord {
            snapshot_id,
            plan_id,
            capped_at,
        })
    }

    pub async fn get_snapshot(&self, id: i64) -> Result<Option<MarketSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>("SELECT * FROM market_snapshots WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    pub async fn count_snapshots(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM market_snapshots")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

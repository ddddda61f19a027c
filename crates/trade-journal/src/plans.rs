use chrono::{DateTime, Utc};
use signal_core::{PlanStatus, TradePlan};
use sqlx::SqliteConnection;

use crate::db::JournalDb;
use crate::error::{JournalError, Result};
use crate::rows::{format_ts, PlanRow};

pub(crate) async fn insert_plan(
    conn: &mut SqliteConnection,
    snapshot_id: i64,
    plan: &TradePlan,
) -> Result<i64> {
    let levels = &plan.levels;
    let result = sqlx::query(
        r#"
        INSERT INTO trade_plans (
            snapshot_id, created_at, direction, entry_zone_start, entry_zone_end,
            stop_loss, tp1, tp2, estimated_rr, probability_score, status, config_version
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot_id)
    .bind(format_ts(&plan.created_at))
    .bind(plan.direction.as_str())
    .bind(levels.entry_zone_start)
    .bind(levels.entry_zone_end)
    .bind(levels.stop_loss)
    .bind(levels.tp1)
    .bind(levels.tp2)
    .bind(plan.estimated_rr)
    .bind(plan.probability_score)
    .bind(plan.status.as_str())
    .bind(plan.config_version)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

impl JournalDb {
    pub async fn get_plan(&self, id: i64) -> Result<Option<TradePlan>> {
        let row = sqlx::query_as::<_, PlanRow>("SELECT * FROM trade_plans WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(PlanRow::into_plan).transpose()
    }

    /// Most recent plans first, optionally filtered by status
    pub async fn list_plans(&self, status: Option<PlanStatus>, limit: i64) -> Result<Vec<TradePlan>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, PlanRow>(
                    "SELECT * FROM trade_plans WHERE status = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, PlanRow>("SELECT * FROM trade_plans ORDER BY id DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
        };

        rows.into_iter().map(PlanRow::into_plan).collect()
    }

    /// Move a plan out of PENDING. The update is a compare-and-set on the
    /// current status, so of two racing transitions at most one succeeds.
    pub async fn transition_plan(&self, plan_id: i64, next: PlanStatus) -> Result<TradePlan> {
        let plan = self
            .retry()
            .run("transition_plan", move || self.try_transition(plan_id, next))
            .await?;

        tracing::info!(plan_id, status = %next, "Plan transitioned");
        Ok(plan)
    }

    async fn try_transition(&self, plan_id: i64, next: PlanStatus) -> Result<TradePlan> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, PlanRow>("SELECT * FROM trade_plans WHERE id = ?")
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(JournalError::PlanNotFound(plan_id))?;
        let mut plan = row.into_plan()?;

        if !plan.status.can_transition_to(next) {
            return Err(JournalError::InvalidTransition {
                plan_id,
                from: plan.status,
                to: next,
            });
        }

        let updated = sqlx::query("UPDATE trade_plans SET status = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(plan_id)
            .bind(plan.status.as_str())
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(JournalError::InvalidTransition {
                plan_id,
                from: plan.status,
                to: next,
            });
        }

        tx.commit().await?;

        plan.status = next;
        Ok(plan)
    }

    /// Plans created in `[from, to)`
    pub async fn count_plans_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trade_plans WHERE created_at >= ? AND created_at < ?",
        )
        .bind(format_ts(&from))
        .bind(format_ts(&to))
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }
}

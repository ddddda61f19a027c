use chrono::{DateTime, Utc};
use signal_core::{
    ensure_finite, ensure_positive, OutcomeCategory, OutcomeReport, PlanStatus, TradeOutcome,
};

use crate::db::JournalDb;
use crate::error::{JournalError, Result};
use crate::rows::{format_ts, OutcomeRow};

/// Field and sign checks that need no database access.
pub fn validate_report(report: &OutcomeReport, breakeven_band: f64) -> Result<()> {
    ensure_positive("entry_price", report.entry_price)?;
    ensure_positive("exit_price", report.exit_price)?;
    ensure_finite("realized_r_multiple", report.realized_r_multiple)?;
    ensure_finite("pnl_percent", report.pnl_percent)?;

    if !report
        .outcome
        .agrees_with(report.realized_r_multiple, breakeven_band)
    {
        return Err(JournalError::InconsistentOutcome {
            outcome: report.outcome,
            r_multiple: report.realized_r_multiple,
        });
    }
    Ok(())
}

impl JournalDb {
    /// Record the realized result of an executed plan. At most one outcome
    /// per plan; a second attempt fails with `DuplicateOutcome`.
    pub async fn record_outcome(
        &self,
        plan_id: i64,
        report: &OutcomeReport,
        breakeven_band: f64,
    ) -> Result<TradeOutcome> {
        validate_report(report, breakeven_band)?;

        let outcome = self
            .retry()
            .run("record_outcome", move || self.try_record_outcome(plan_id, report))
            .await?;

        tracing::info!(
            plan_id,
            outcome = %outcome.outcome,
            r_multiple = outcome.realized_r_multiple,
            "Outcome recorded"
        );
        Ok(outcome)
    }

    async fn try_record_outcome(&self, plan_id: i64, report: &OutcomeReport) -> Result<TradeOutcome> {
        let mut tx = self.pool().begin().await?;

        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM trade_plans WHERE id = ?")
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await?;
        let status: PlanStatus = match status {
            Some((raw,)) => raw.parse()?,
            None => return Err(JournalError::PlanNotFound(plan_id)),
        };
        if status != PlanStatus::Executed {
            return Err(JournalError::PlanNotExecuted { plan_id, status });
        }

        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM trade_outcomes WHERE plan_id = ?")
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(JournalError::DuplicateOutcome(plan_id));
        }

        let recorded_at = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO trade_outcomes (
                plan_id, entry_price, exit_price, outcome, realized_r_multiple,
                pnl_percent, comments, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan_id)
        .bind(report.entry_price)
        .bind(report.exit_price)
        .bind(report.outcome.as_str())
        .bind(report.realized_r_multiple)
        .bind(report.pnl_percent)
        .bind(&report.comments)
        .bind(format_ts(&recorded_at))
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            // a concurrent writer got there first
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(JournalError::DuplicateOutcome(plan_id));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        Ok(TradeOutcome {
            id: Some(id),
            plan_id,
            entry_price: report.entry_price,
            exit_price: report.exit_price,
            outcome: report.outcome,
            realized_r_multiple: report.realized_r_multiple,
            pnl_percent: report.pnl_percent,
            comments: report.comments.clone(),
            recorded_at,
        })
    }

    pub async fn get_outcome_for_plan(&self, plan_id: i64) -> Result<Option<TradeOutcome>> {
        let row = sqlx::query_as::<_, OutcomeRow>("SELECT * FROM trade_outcomes WHERE plan_id = ?")
            .bind(plan_id)
            .fetch_optional(self.pool())
            .await?;

        row.map(OutcomeRow::into_outcome).transpose()
    }

    /// Categories of the `limit` most recently recorded outcomes, newest first
    pub async fn recent_outcome_categories(&self, limit: i64) -> Result<Vec<OutcomeCategory>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT outcome FROM trade_outcomes ORDER BY id DESC LIMIT ?")
                .bind(limit)
                .fetch_all(self.pool())
                .await?;

        rows.into_iter()
            .map(|(raw,)| raw.parse().map_err(JournalError::from))
            .collect()
    }

    /// Sum of losing `pnl_percent` values, as a positive number, over outcomes
    /// whose plan was created in `[from, to)`
    pub async fn realized_loss_percent_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64> {
        let (loss,): (f64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(-SUM(o.pnl_percent), 0.0)
            FROM trade_outcomes o
            JOIN trade_plans p ON p.id = o.plan_id
            WHERE o.pnl_percent < 0 AND p.created_at >= ? AND p.created_at < ?
            "#,
        )
        .bind(format_ts(&from))
        .bind(format_ts(&to))
        .fetch_one(self.pool())
        .await?;

        Ok(loss)
    }
}

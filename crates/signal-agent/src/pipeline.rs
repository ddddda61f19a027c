//! One evaluation cycle, the periodic review, and the lifecycle and feedback
//! operations the external scheduler drives.
//!
//! Each entry point either commits its writes or leaves the journal
//! untouched. Notification delivery happens after the commit and never
//! changes the result.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use learning_aggregator::{render_report, LearningAggregator};
use notification_service::{Alert, AlertType, NotificationService, PositionSizing};
use setup_evaluator::{ConfigError, Decision, RejectReason, Rejection, SetupEvaluator};
use signal_core::{
    LearningReview, MarketObservation, MarketSnapshot, OutcomeCategory, OutcomeReport,
    PlanStatus, TradeOutcome, TradePlan, ValidationError,
};
use thiserror::Error;
use trade_journal::{ConfigVersion, JournalDb, JournalError};

use crate::config::AgentConfig;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid observation: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("Configuration update rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("No evaluator configuration stored; run startup first")]
    NoActiveConfig,

    #[error("Review window ends before it starts ({start} > {end})")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Review {0} has no action items to apply")]
    NothingToApply(i64),

    #[error("Evaluator seed configuration unusable: {0}")]
    Seed(String),
}

impl PipelineError {
    /// Storage failure that outlived the retry budget
    pub fn is_storage(&self) -> bool {
        matches!(self, PipelineError::Journal(JournalError::Sqlx(_)))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// How an evaluation cycle ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    PlanCreated {
        snapshot_id: i64,
        plan: TradePlan,
    },
    NoTrade {
        snapshot_id: i64,
        rejection: Rejection,
    },
}

impl CycleOutcome {
    pub fn snapshot_id(&self) -> i64 {
        match self {
            CycleOutcome::PlanCreated { snapshot_id, .. }
            | CycleOutcome::NoTrade { snapshot_id, .. } => *snapshot_id,
        }
    }

    pub fn plan(&self) -> Option<&TradePlan> {
        match self {
            CycleOutcome::PlanCreated { plan, .. } => Some(plan),
            CycleOutcome::NoTrade { .. } => None,
        }
    }
}

pub struct SignalPipeline {
    journal: JournalDb,
    config: AgentConfig,
    aggregator: LearningAggregator,
    notifier: NotificationService,
}

impl SignalPipeline {
    pub fn new(journal: JournalDb, config: AgentConfig, notifier: NotificationService) -> Self {
        let aggregator = LearningAggregator::new(config.review.clone());
        Self {
            journal,
            config,
            aggregator,
            notifier,
        }
    }

    pub fn journal(&self) -> &JournalDb {
        &self.journal
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Seed configuration version 1 when the journal has none, and return
    /// the active version.
    pub async fn startup(&self) -> Result<ConfigVersion> {
        let seed = self
            .config
            .seed_evaluator_config()
            .map_err(|e| PipelineError::Seed(format!("{e:#}")))?;
        let active = self.journal.seed_config(&seed).await?;
        tracing::info!(
            version = active.version,
            "Evaluator configuration v{} active",
            active.version
        );
        Ok(active)
    }

    async fn notify(&self, alert: Alert) {
        self.notifier.send_alert_async(&alert).await;
    }

    async fn active_config(&self) -> Result<ConfigVersion> {
        self.journal
            .active_config()
            .await?
            .ok_or(PipelineError::NoActiveConfig)
    }

    /// Validate an observation and run it through the evaluator. A missing
    /// session is derived from the timestamp.
    pub async fn evaluate_cycle(&self, observation: &MarketObservation) -> Result<CycleOutcome> {
        let snapshot = self.snapshot_from(observation)?;
        self.evaluate_snapshot(&snapshot).await
    }

    fn snapshot_from(&self, observation: &MarketObservation) -> Result<MarketSnapshot> {
        let session_missing = observation
            .session
            .as_deref()
            .map_or(true, |s| s.trim().is_empty());

        if session_missing {
            if let Some(timestamp) = observation.timestamp {
                let mut filled = observation.clone();
                let session = self.config.session_clock.classify(timestamp);
                tracing::debug!(%session, "Session derived from clock");
                filled.session = Some(session.to_string());
                return Ok(filled.validate()?);
            }
        }
        Ok(observation.validate()?)
    }

    pub async fn evaluate_snapshot(&self, snapshot: &MarketSnapshot) -> Result<CycleOutcome> {
        let active = self.active_config().await?;
        tracing::info!(
            timestamp = %snapshot.timestamp,
            session = %snapshot.session,
            config_version = active.version,
            "Evaluation cycle started"
        );

        if let Some(rejection) = self.risk_guard(snapshot).await? {
            let snapshot_id = self.journal.record_snapshot(snapshot).await?;
            return Ok(self.risk_limited(snapshot_id, rejection).await);
        }

        let evaluator = SetupEvaluator::new(active.config);
        match evaluator.evaluate(snapshot) {
            Decision::Plan(mut plan) => {
                let cap = self.config.max_plans_per_day;
                let record = if cap > 0 {
                    self.journal.record_cycle_capped(snapshot, &plan, cap).await?
                } else {
                    self.journal.record_cycle(snapshot, Some(&plan)).await?
                };
                if let Some(created) = record.capped_at {
                    // another cycle filled the day between the guard and the write
                    let rejection = daily_cap_rejection(created, snapshot.timestamp, cap);
                    return Ok(self.risk_limited(record.snapshot_id, rejection).await);
                }
                plan.id = record.plan_id;
                plan.snapshot_id = Some(record.snapshot_id);

                tracing::info!(
                    snapshot_id = record.snapshot_id,
                    plan_id = ?record.plan_id,
                    score = plan.probability_score,
                    rr = plan.estimated_rr,
                    "Trade plan created"
                );

                if let Some(plan_id) = record.plan_id {
                    let sizing = PositionSizing::compute(
                        self.config.account_balance,
                        self.config.risk_per_trade_percent,
                        &plan.levels,
                    );
                    self.notify(Alert::plan_created(
                        plan_id,
                        &plan,
                        snapshot.session,
                        sizing,
                    ))
                    .await;
                }

                Ok(CycleOutcome::PlanCreated {
                    snapshot_id: record.snapshot_id,
                    plan,
                })
            }
            Decision::NoTrade(rejection) => {
                let snapshot_id = self.journal.record_snapshot(snapshot).await?;
                tracing::info!(
                    snapshot_id,
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "No trade"
                );
                Ok(CycleOutcome::NoTrade {
                    snapshot_id,
                    rejection,
                })
            }
        }
    }

    async fn risk_limited(&self, snapshot_id: i64, rejection: Rejection) -> CycleOutcome {
        tracing::warn!(snapshot_id, detail = %rejection.detail, "Risk limit reached, cycle skipped");
        self.notify(Alert::new(
            AlertType::RiskLimitReached {
                reason: rejection.detail.clone(),
            },
            "XAUUSD risk limit reached",
            format!("Snapshot {} recorded without a plan", snapshot_id),
        ))
        .await;
        CycleOutcome::NoTrade {
            snapshot_id,
            rejection,
        }
    }

    /// Daily plan cap, consecutive-loss stop and daily drawdown. A zero limit
    /// disables its check. The cap is checked again inside the plan write.
    async fn risk_guard(&self, snapshot: &MarketSnapshot) -> Result<Option<Rejection>> {
        let day_start = snapshot.timestamp.date_naive().and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);

        let cap = self.config.max_plans_per_day;
        if cap > 0 {
            let created = self
                .journal
                .count_plans_created_between(day_start, day_end)
                .await?;
            if created >= cap {
                return Ok(Some(daily_cap_rejection(created, snapshot.timestamp, cap)));
            }
        }

        let stop = self.config.consecutive_loss_stop;
        if stop > 0 {
            let recent = self.journal.recent_outcome_categories(stop).await?;
            if recent.len() as i64 >= stop
                && recent.iter().all(|c| *c == OutcomeCategory::Loss)
            {
                return Ok(Some(Rejection::new(
                    RejectReason::RiskLimitReached,
                    format!("last {} outcomes were losses", stop),
                )));
            }
        }

        let max_drawdown = self.config.max_daily_drawdown_percent;
        if max_drawdown > 0.0 {
            let lost = self
                .journal
                .realized_loss_percent_between(day_start, day_end)
                .await?;
            if lost >= max_drawdown {
                return Ok(Some(Rejection::new(
                    RejectReason::RiskLimitReached,
                    format!(
                        "{:.2}% lost on {}, daily drawdown limit {:.2}%",
                        lost,
                        day_start.format("%Y-%m-%d"),
                        max_drawdown
                    ),
                )));
            }
        }

        Ok(None)
    }

    pub async fn transition_plan(&self, plan_id: i64, next: PlanStatus) -> Result<TradePlan> {
        Ok(self.journal.transition_plan(plan_id, next).await?)
    }

    pub async fn record_outcome(&self, plan_id: i64, report: &OutcomeReport) -> Result<TradeOutcome> {
        Ok(self
            .journal
            .record_outcome(plan_id, report, self.config.breakeven_band_r)
            .await?)
    }

    /// Review every closed trade whose snapshot falls in `[start, end]`,
    /// persist it and publish the text report.
    pub async fn run_review(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<LearningReview> {
        if end < start {
            return Err(PipelineError::InvalidWindow { start, end });
        }

        let active = self.active_config().await?;
        let sample = self.journal.window_sample(start, end).await?;
        let mut review = self
            .aggregator
            .review(&sample, &active.config, start, end, Utc::now());

        let review_id = self.journal.append_review(&review).await?;
        review.id = Some(review_id);

        self.notify(Alert::review_published(
            review_id,
            &review,
            render_report(&review),
        ))
        .await;
        Ok(review)
    }

    /// Apply a stored review's action items to the active configuration and
    /// persist the result as the next version.
    pub async fn apply_review(&self, review_id: i64) -> Result<ConfigVersion> {
        let review = self
            .journal
            .get_review(review_id)
            .await?
            .ok_or(JournalError::ReviewNotFound(review_id))?;
        if review.action_items.is_empty() {
            return Err(PipelineError::NothingToApply(review_id));
        }

        let active = self.active_config().await?;
        let next = active.config.apply_action_items(&review.action_items)?;
        let stored = self.journal.insert_config_version(&next, review_id).await?;

        tracing::info!(
            review_id,
            from = active.version,
            to = stored.version,
            "Evaluator configuration updated from review"
        );
        Ok(stored)
    }
}

fn daily_cap_rejection(created: i64, timestamp: DateTime<Utc>, cap: i64) -> Rejection {
    Rejection::new(
        RejectReason::RiskLimitReached,
        format!(
            "{} plans already created on {}, daily limit {}",
            created,
            timestamp.format("%Y-%m-%d"),
            cap
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signal_core::{FilterName, Session};

    async fn pipeline_with(config: AgentConfig) -> SignalPipeline {
        let journal = JournalDb::in_memory().await.unwrap();
        let pipeline = SignalPipeline::new(journal, config, NotificationService::disabled());
        pipeline.startup().await.unwrap();
        pipeline
    }

    async fn pipeline() -> SignalPipeline {
        pipeline_with(AgentConfig::default()).await
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 30, 0).unwrap()
    }

    fn observation(timestamp: DateTime<Utc>, session: Option<&str>) -> MarketObservation {
        MarketObservation {
            timestamp: Some(timestamp),
            session: session.map(str::to_string),
            htf_trend: "Bearish".to_string(),
            htf_structure: "LH".to_string(),
            key_resistance_level: 2040.0,
            liquidity_event_type: Some("Asian High Sweep".to_string()),
            has_large_wick: true,
            consecutive_bullish_candles: 2,
            atr_value: 4.0,
            rsi_divergence: true,
            vwap_distance: 6.5,
            volume_spike: false,
            spread_value: 0.2,
            news_event_proximity_minutes: None,
        }
    }

    fn report(outcome: OutcomeCategory) -> OutcomeReport {
        let r = match outcome {
            OutcomeCategory::Win => 2.0,
            OutcomeCategory::Loss => -1.0,
            OutcomeCategory::BreakEven => 0.0,
        };
        OutcomeReport {
            entry_price: 2038.0,
            exit_price: 2038.0 - 3.0 * r,
            outcome,
            realized_r_multiple: r,
            pnl_percent: r * 0.5,
            comments: None,
        }
    }

    async fn closed_trade(p: &SignalPipeline, obs: MarketObservation, outcome: OutcomeCategory) {
        let cycle = p.evaluate_cycle(&obs).await.unwrap();
        let plan_id = cycle.plan().and_then(|plan| plan.id).unwrap();
        p.transition_plan(plan_id, PlanStatus::Executed).await.unwrap();
        p.record_outcome(plan_id, &report(outcome)).await.unwrap();
    }

    #[tokio::test]
    async fn test_qualifying_cycle_creates_plan() {
        let p = pipeline().await;
        let cycle = p
            .evaluate_cycle(&observation(at(5, 9), Some("London")))
            .await
            .unwrap();

        let plan = cycle.plan().unwrap();
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.config_version, 1);
        assert!(plan.probability_score >= 70.0);
        assert_eq!(plan.snapshot_id, Some(cycle.snapshot_id()));

        let stored = p.journal().get_plan(plan.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(&stored, plan);
    }

    #[tokio::test]
    async fn test_rejection_records_snapshot_only() {
        let p = pipeline().await;
        let cycle = p
            .evaluate_cycle(&observation(at(5, 2), Some("Asian")))
            .await
            .unwrap();

        match cycle {
            CycleOutcome::NoTrade { rejection, .. } => {
                assert_eq!(rejection.reason, RejectReason::OutsideSession)
            }
            other => panic!("expected no trade, got {:?}", other),
        }
        assert_eq!(p.journal().count_snapshots().await.unwrap(), 1);
        assert!(p.journal().list_plans(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_observation_writes_nothing() {
        let p = pipeline().await;
        let mut obs = observation(at(5, 9), Some("London"));
        obs.htf_trend = "Sideways-ish".to_string();

        let err = p.evaluate_cycle(&obs).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(p.journal().count_snapshots().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_session_uses_clock() {
        let p = pipeline().await;
        let cycle = p.evaluate_cycle(&observation(at(5, 9), None)).await.unwrap();
        let snapshot = p
            .journal()
            .get_snapshot(cycle.snapshot_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.session, Session::London);
        assert!(cycle.plan().is_some());
    }

    #[tokio::test]
    async fn test_daily_plan_cap() {
        let p = pipeline_with(AgentConfig {
            max_plans_per_day: 1,
            ..AgentConfig::default()
        })
        .await;

        let first = p.evaluate_cycle(&observation(at(5, 9), None)).await.unwrap();
        assert!(first.plan().is_some());

        let second = p.evaluate_cycle(&observation(at(5, 10), None)).await.unwrap();
        match second {
            CycleOutcome::NoTrade { rejection, .. } => {
                assert_eq!(rejection.reason, RejectReason::RiskLimitReached)
            }
            other => panic!("expected risk limit, got {:?}", other),
        }
        assert_eq!(p.journal().count_snapshots().await.unwrap(), 2);

        let next_day = p.evaluate_cycle(&observation(at(6, 9), None)).await.unwrap();
        assert!(next_day.plan().is_some());
    }

    #[tokio::test]
    async fn test_consecutive_losses_stop_new_plans() {
        let p = pipeline_with(AgentConfig {
            consecutive_loss_stop: 2,
            ..AgentConfig::default()
        })
        .await;

        closed_trade(&p, observation(at(4, 9), None), OutcomeCategory::Loss).await;
        closed_trade(&p, observation(at(5, 9), None), OutcomeCategory::Loss).await;

        let cycle = p.evaluate_cycle(&observation(at(6, 9), None)).await.unwrap();
        assert!(cycle.plan().is_none());
        assert_eq!(
            cycle,
            CycleOutcome::NoTrade {
                snapshot_id: cycle.snapshot_id(),
                rejection: Rejection::new(
                    RejectReason::RiskLimitReached,
                    "last 2 outcomes were losses"
                ),
            }
        );
    }

    #[tokio::test]
    async fn test_daily_drawdown_stops_new_plans() {
        let p = pipeline_with(AgentConfig {
            max_plans_per_day: 0,
            consecutive_loss_stop: 0,
            max_daily_drawdown_percent: 1.0,
            ..AgentConfig::default()
        })
        .await;

        // a winning day before does not offset the losses
        closed_trade(&p, observation(at(4, 9), None), OutcomeCategory::Win).await;
        closed_trade(&p, observation(at(5, 9), None), OutcomeCategory::Loss).await;
        closed_trade(&p, observation(at(5, 10), None), OutcomeCategory::Loss).await;

        let cycle = p.evaluate_cycle(&observation(at(5, 11), None)).await.unwrap();
        match cycle {
            CycleOutcome::NoTrade { rejection, .. } => {
                assert_eq!(rejection.reason, RejectReason::RiskLimitReached);
                assert_eq!(
                    rejection.detail,
                    "1.00% lost on 2024-03-05, daily drawdown limit 1.00%"
                );
            }
            other => panic!("expected risk limit, got {:?}", other),
        }

        let next_day = p.evaluate_cycle(&observation(at(6, 9), None)).await.unwrap();
        assert!(next_day.plan().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_seed_file_is_a_pipeline_error() {
        let journal = JournalDb::in_memory().await.unwrap();
        let config = AgentConfig {
            evaluator_config_path: Some("/nonexistent/evaluator.json".into()),
            ..AgentConfig::default()
        };
        let p = SignalPipeline::new(journal, config, NotificationService::disabled());

        let err = p.startup().await.unwrap_err();
        assert!(matches!(err, PipelineError::Seed(ref msg) if msg.contains("/nonexistent/evaluator.json")));
        assert!(p.journal().active_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_review_then_apply_tightens_sessions() {
        let p = pipeline_with(AgentConfig {
            max_plans_per_day: 0,
            consecutive_loss_stop: 0,
            ..AgentConfig::default()
        })
        .await;

        for i in 0..12u32 {
            let london = i < 6;
            let win = if london { i % 6 != 0 } else { i % 6 == 0 };
            let outcome = if win {
                OutcomeCategory::Win
            } else {
                OutcomeCategory::Loss
            };
            let session = if london { "London" } else { "New York" };
            let hour = if london { 9 } else { 17 };
            closed_trade(&p, observation(at(4 + i % 6, hour), Some(session)), outcome).await;
        }

        let review = p
            .run_review(at(1, 0), at(20, 0))
            .await
            .unwrap();
        assert_eq!(review.sample_size, 12);
        assert!(!review.low_confidence);
        assert!(review
            .action_items
            .iter()
            .any(|a| a.filter == FilterName::Session && a.to_string() == "session != NEW_YORK"));

        let version = p.apply_review(review.id.unwrap()).await.unwrap();
        assert_eq!(version.version, 2);
        assert_eq!(version.source_review_id, review.id);
        assert!(!version.config.active_sessions.contains(&Session::NewYork));

        let cycle = p
            .evaluate_cycle(&observation(at(21, 17), Some("New York")))
            .await
            .unwrap();
        match cycle {
            CycleOutcome::NoTrade { rejection, .. } => {
                assert_eq!(rejection.reason, RejectReason::OutsideSession)
            }
            other => panic!("expected no trade, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_low_confidence_review_has_nothing_to_apply() {
        let p = pipeline().await;
        closed_trade(&p, observation(at(5, 9), None), OutcomeCategory::Win).await;

        let review = p.run_review(at(1, 0), at(20, 0)).await.unwrap();
        assert!(review.low_confidence);

        let err = p.apply_review(review.id.unwrap()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NothingToApply(_)));
        assert_eq!(p.journal().list_configs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inverted_window_is_rejected() {
        let p = pipeline().await;
        let err = p.run_review(at(10, 0), at(1, 0)).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWindow { .. }));
    }

    #[tokio::test]
    async fn test_evaluate_before_startup_fails() {
        let journal = JournalDb::in_memory().await.unwrap();
        let p = SignalPipeline::new(journal, AgentConfig::default(), NotificationService::disabled());
        let err = p
            .evaluate_cycle(&observation(at(5, 9), None))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoActiveConfig));
        assert_eq!(p.journal().count_snapshots().await.unwrap(), 0);
    }
}

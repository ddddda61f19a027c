use std::fmt;

use serde::{Deserialize, Serialize};
use signal_core::{
    GatePredicate, LevelModel, MarketSnapshot, PlanStatus, ScoreModel, TradePlan,
};

use crate::config::EvaluatorConfig;
use crate::models::{AtrLevelModel, RuleScoreModel};

/// Structural predicates checked by gate 3, in order
pub const STRUCTURAL_PREDICATES: [GatePredicate; 7] = [
    GatePredicate::LiquidityEvent,
    GatePredicate::TrendAlignment,
    GatePredicate::Confirmation,
    GatePredicate::VwapBounds,
    GatePredicate::SpreadCeiling,
    GatePredicate::CandleCeiling,
    GatePredicate::RequiredFlags,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    OutsideSession,
    NewsProximityTooClose,
    NoQualifyingStructure,
    BelowProbabilityThreshold,
    DegenerateRr,
    /// Raised by the cycle's risk guard, never by the evaluator itself
    RiskLimitReached,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::OutsideSession => "OUTSIDE_SESSION",
            RejectReason::NewsProximityTooClose => "NEWS_PROXIMITY_TOO_CLOSE",
            RejectReason::NoQualifyingStructure => "NO_QUALIFYING_STRUCTURE",
            RejectReason::BelowProbabilityThreshold => "BELOW_PROBABILITY_THRESHOLD",
            RejectReason::DegenerateRr => "DEGENERATE_RR",
            RejectReason::RiskLimitReached => "RISK_LIMIT_REACHED",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A "NO TRADE" result. Not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Plan(TradePlan),
    NoTrade(Rejection),
}

impl Decision {
    pub fn plan(&self) -> Option<&TradePlan> {
        match self {
            Decision::Plan(plan) => Some(plan),
            Decision::NoTrade(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Decision::Plan(_) => None,
            Decision::NoTrade(rejection) => Some(rejection),
        }
    }
}

/// Runs the gate sequence for one configuration version.
///
/// Evaluation is pure: the plan's `created_at` is the snapshot timestamp and
/// nothing outside `config` and the snapshot is consulted.
pub struct SetupEvaluator {
    config: EvaluatorConfig,
    score_model: Box<dyn ScoreModel>,
    level_model: Box<dyn LevelModel>,
}

impl SetupEvaluator {
    /// Evaluator with the rule score and ATR level models built from `config`
    pub fn new(config: EvaluatorConfig) -> Self {
        let score_model = Box::new(RuleScoreModel::new(config.score_weights.clone()));
        let level_model = Box::new(AtrLevelModel::new(config.levels.clone()));
        Self::with_models(config, score_model, level_model)
    }

    pub fn with_models(
        config: EvaluatorConfig,
        score_model: Box<dyn ScoreModel>,
        level_model: Box<dyn LevelModel>,
    ) -> Self {
        Self {
            config,
            score_model,
            level_model,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn score(&self, snapshot: &MarketSnapshot) -> f64 {
        self.score_model.score(snapshot)
    }

    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Decision {
        match self.run_gates(snapshot) {
            Ok(plan) => {
                tracing::debug!(
                    score = plan.probability_score,
                    rr = plan.estimated_rr,
                    config_version = plan.config_version,
                    "Setup qualified"
                );
                Decision::Plan(plan)
            }
            Err(rejection) => {
                tracing::debug!(
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "No trade"
                );
                Decision::NoTrade(rejection)
            }
        }
    }

    fn run_gates(&self, snapshot: &MarketSnapshot) -> Result<TradePlan, Rejection> {
        let config = &self.config;

        if !config.passes(GatePredicate::SessionWindow, snapshot, 0.0) {
            return Err(Rejection::new(
                RejectReason::OutsideSession,
                format!("session {} is not active", snapshot.session),
            ));
        }

        if !config.passes(GatePredicate::NewsProximity, snapshot, 0.0) {
            return Err(Rejection::new(
                RejectReason::NewsProximityTooClose,
                format!(
                    "news in {} min, minimum {} min",
                    snapshot.news_event_proximity_minutes.unwrap_or_default(),
                    config.min_news_proximity_minutes
                ),
            ));
        }

        if let Some(failed) = STRUCTURAL_PREDICATES
            .into_iter()
            .find(|p| !config.passes(*p, snapshot, 0.0))
        {
            return Err(Rejection::new(
                RejectReason::NoQualifyingStructure,
                format!("{} not satisfied", failed),
            ));
        }

        let score = self.score_model.score(snapshot);
        if !config.passes(GatePredicate::ProbabilityThreshold, snapshot, score) {
            return Err(Rejection::new(
                RejectReason::BelowProbabilityThreshold,
                format!(
                    "{} scored {:.1}, threshold {:.1}",
                    self.score_model.name(),
                    score,
                    config.min_probability_score
                ),
            ));
        }

        let levels = self.level_model.levels(snapshot, config.direction);
        let rr = levels.risk_reward();
        if !levels.is_well_formed(config.direction) || !rr.is_finite() {
            return Err(Rejection::new(
                RejectReason::DegenerateRr,
                format!("{} produced invalid levels", self.level_model.name()),
            ));
        }
        if rr < config.min_risk_reward {
            return Err(Rejection::new(
                RejectReason::DegenerateRr,
                format!("R:R {:.2} below minimum {:.2}", rr, config.min_risk_reward),
            ));
        }

        Ok(TradePlan {
            id: None,
            snapshot_id: snapshot.id,
            created_at: snapshot.timestamp,
            direction: config.direction,
            levels,
            estimated_rr: rr,
            probability_score: score.clamp(0.0, 100.0),
            status: PlanStatus::Pending,
            config_version: config.version,
        })
    }
}

impl fmt::Debug for SetupEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupEvaluator")
            .field("config_version", &self.config.version)
            .field("score_model", &self.score_model.name())
            .field("level_model", &self.level_model.name())
            .finish()
    }
}

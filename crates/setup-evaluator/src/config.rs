//! Versioned evaluator configuration
//!
//! Every evaluation binds to exactly one `EvaluatorConfig` version. New versions
//! are only produced by applying a learning review's action items, so each
//! threshold change can be traced back to the review that proposed it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use signal_core::{
    ActionItem, ActionValue, ComparisonOp, Direction, FilterName, GatePredicate, HtfTrend,
    LiquidityEvent, MarketSnapshot, Session,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported action item: {0}")]
    UnsupportedAction(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration-driven structural predicate (gate 3)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureRule {
    /// Liquidity events that qualify a setup. Empty means no requirement.
    pub qualifying_events: BTreeSet<LiquidityEvent>,
    /// HTF trends that disqualify a setup for the configured direction
    pub rejected_trends: BTreeSet<HtfTrend>,
    /// Require RSI divergence or an exhaustion wick
    pub require_confirmation: bool,
    pub min_vwap_distance: Option<f64>,
    pub max_vwap_distance: Option<f64>,
    pub max_spread: Option<f64>,
    pub max_consecutive_bullish_candles: Option<u32>,
    pub require_rsi_divergence: bool,
    pub require_large_wick: bool,
    pub require_volume_spike: bool,
}

impl Default for StructureRule {
    fn default() -> Self {
        Self {
            qualifying_events: LiquidityEvent::ALL
                .into_iter()
                .filter(|e| e.is_event())
                .collect(),
            rejected_trends: BTreeSet::from([HtfTrend::Bullish]),
            require_confirmation: true,
            min_vwap_distance: None,
            max_vwap_distance: None,
            max_spread: None,
            max_consecutive_bullish_candles: None,
            require_rsi_divergence: false,
            require_large_wick: false,
            require_volume_spike: false,
        }
    }
}

/// Additive weights of the rule-based score model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub bearish_trend: f64,
    pub ranging_trend: f64,
    pub liquidity_event: f64,
    pub rsi_divergence: f64,
    pub large_wick: f64,
    pub volume_spike: f64,
    pub vwap_stretch: f64,
    /// Absolute VWAP distance at which `vwap_stretch` is awarded
    pub vwap_stretch_distance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            bearish_trend: 30.0,
            ranging_trend: 10.0,
            liquidity_event: 25.0,
            rsi_divergence: 10.0,
            large_wick: 10.0,
            volume_spike: 10.0,
            vwap_stretch: 15.0,
            vwap_stretch_distance: 5.0,
        }
    }
}

/// Geometry of the ATR level model, in ATR units and R multiples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelParams {
    pub stop_buffer_atr: f64,
    pub entry_offset_atr: f64,
    pub entry_zone_width_atr: f64,
    pub tp1_r: f64,
    pub tp2_r: f64,
}

impl Default for LevelParams {
    fn default() -> Self {
        Self {
            stop_buffer_atr: 0.25,
            entry_offset_atr: 0.25,
            entry_zone_width_atr: 0.5,
            tp1_r: 2.0,
            tp2_r: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub version: i64,
    pub direction: Direction,
    pub active_sessions: BTreeSet<Session>,
    pub min_news_proximity_minutes: i64,
    pub structure: StructureRule,
    pub min_probability_score: f64,
    pub min_risk_reward: f64,
    pub score_weights: ScoreWeights,
    pub levels: LevelParams,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            version: 1,
            direction: Direction::Short,
            active_sessions: BTreeSet::from([Session::London, Session::NewYork]),
            min_news_proximity_minutes: 15,
            structure: StructureRule::default(),
            min_probability_score: 70.0,
            min_risk_reward: 1.5,
            score_weights: ScoreWeights::default(),
            levels: LevelParams::default(),
        }
    }
}

impl EvaluatorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version < 1 {
            return Err(ConfigError::Invalid(format!(
                "version must be >= 1, got {}",
                self.version
            )));
        }
        if !(0.0..=100.0).contains(&self.min_probability_score) {
            return Err(ConfigError::Invalid(format!(
                "min_probability_score must be within 0-100, got {}",
                self.min_probability_score
            )));
        }
        if !self.min_risk_reward.is_finite() || self.min_risk_reward <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_risk_reward must be positive, got {}",
                self.min_risk_reward
            )));
        }
        if self.min_news_proximity_minutes < 0 {
            return Err(ConfigError::Invalid(
                "min_news_proximity_minutes must be non-negative".into(),
            ));
        }
        if let (Some(min), Some(max)) = (
            self.structure.min_vwap_distance,
            self.structure.max_vwap_distance,
        ) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "min_vwap_distance {} exceeds max_vwap_distance {}",
                    min, max
                )));
            }
        }
        let lp = &self.levels;
        if lp.tp1_r <= 0.0 || lp.tp2_r <= lp.tp1_r {
            return Err(ConfigError::Invalid(format!(
                "take-profit multiples must satisfy 0 < tp1_r < tp2_r, got {} / {}",
                lp.tp1_r, lp.tp2_r
            )));
        }
        Ok(())
    }

    /// Evaluate a single gating predicate. `score` is only consulted by
    /// `ProbabilityThreshold`.
    pub fn passes(&self, predicate: GatePredicate, snapshot: &MarketSnapshot, score: f64) -> bool {
        let rule = &self.structure;
        match predicate {
            GatePredicate::SessionWindow => self.active_sessions.contains(&snapshot.session),
            GatePredicate::NewsProximity => match snapshot.news_event_proximity_minutes {
                Some(minutes) => minutes >= self.min_news_proximity_minutes,
                None => true,
            },
            GatePredicate::LiquidityEvent => {
                rule.qualifying_events.is_empty()
                    || rule.qualifying_events.contains(&snapshot.liquidity_event_type)
            }
            GatePredicate::TrendAlignment => !rule.rejected_trends.contains(&snapshot.htf_trend),
            GatePredicate::Confirmation => {
                !rule.require_confirmation || snapshot.rsi_divergence || snapshot.has_large_wick
            }
            GatePredicate::VwapBounds => {
                let above_floor = rule
                    .min_vwap_distance
                    .map_or(true, |min| snapshot.vwap_distance >= min);
                let below_ceiling = rule
                    .max_vwap_distance
                    .map_or(true, |max| snapshot.vwap_distance <= max);
                above_floor && below_ceiling
            }
            GatePredicate::SpreadCeiling => rule
                .max_spread
                .map_or(true, |max| snapshot.spread_value <= max),
            GatePredicate::CandleCeiling => rule
                .max_consecutive_bullish_candles
                .map_or(true, |max| snapshot.consecutive_bullish_candles <= max),
            GatePredicate::RequiredFlags => {
                (!rule.require_rsi_divergence || snapshot.rsi_divergence)
                    && (!rule.require_large_wick || snapshot.has_large_wick)
                    && (!rule.require_volume_spike || snapshot.volume_spike)
            }
            GatePredicate::ProbabilityThreshold => {
                score.is_finite() && score >= self.min_probability_score
            }
        }
    }

    /// Produce the next configuration version with the action items applied.
    /// The receiver is left untouched. Only tightening items are accepted;
    /// anything that would widen a gate, or close it entirely, is
    /// `UnsupportedAction`.
    pub fn apply_action_items(&self, items: &[ActionItem]) -> Result<EvaluatorConfig, ConfigError> {
        let mut next = self.clone();
        next.version = self.version + 1;

        for item in items {
            next.apply_one(item)?;
        }

        next.validate()?;
        Ok(next)
    }

    fn apply_one(&mut self, item: &ActionItem) -> Result<(), ConfigError> {
        let unsupported = || ConfigError::UnsupportedAction(item.to_string());
        let rule = &mut self.structure;

        match (item.filter, item.operator, &item.value) {
            (FilterName::Session, ComparisonOp::Ne, ActionValue::Label(label)) => {
                let session: Session = label.parse().map_err(|_| unsupported())?;
                self.active_sessions.remove(&session);
                if self.active_sessions.is_empty() {
                    return Err(ConfigError::UnsupportedAction(format!(
                        "{} would leave no active session",
                        item
                    )));
                }
            }
            (FilterName::HtfTrend, ComparisonOp::Ne, ActionValue::Label(label)) => {
                let trend: HtfTrend = label.parse().map_err(|_| unsupported())?;
                rule.rejected_trends.insert(trend);
                if HtfTrend::ALL.iter().all(|t| rule.rejected_trends.contains(t)) {
                    return Err(ConfigError::UnsupportedAction(format!(
                        "{} would reject every trend",
                        item
                    )));
                }
            }
            (FilterName::LiquidityEventType, ComparisonOp::Ne, ActionValue::Label(label)) => {
                let event: LiquidityEvent = label.parse().map_err(|_| unsupported())?;
                // an empty set admits every event, so excluding one means listing the rest
                if rule.qualifying_events.is_empty() {
                    rule.qualifying_events = LiquidityEvent::ALL.into_iter().collect();
                }
                rule.qualifying_events.remove(&event);
                if rule.qualifying_events.is_empty() {
                    return Err(ConfigError::UnsupportedAction(format!(
                        "{} would leave no qualifying liquidity event",
                        item
                    )));
                }
            }
            (FilterName::VwapDistance, op, ActionValue::Number(x)) => match op {
                ComparisonOp::Gt | ComparisonOp::Ge => {
                    rule.min_vwap_distance = Some(tighten_floor(rule.min_vwap_distance, *x));
                }
                ComparisonOp::Lt | ComparisonOp::Le => {
                    rule.max_vwap_distance = Some(tighten_ceiling(rule.max_vwap_distance, *x));
                }
                _ => return Err(unsupported()),
            },
            (FilterName::NewsEventProximityMinutes, ComparisonOp::Gt | ComparisonOp::Ge, ActionValue::Number(x)) => {
                let minutes = x.ceil() as i64;
                self.min_news_proximity_minutes = self.min_news_proximity_minutes.max(minutes);
            }
            (FilterName::SpreadValue, ComparisonOp::Lt | ComparisonOp::Le, ActionValue::Number(x)) => {
                rule.max_spread = Some(tighten_ceiling(rule.max_spread, *x));
            }
            (
                FilterName::ConsecutiveBullishCandles,
                ComparisonOp::Lt | ComparisonOp::Le,
                ActionValue::Number(x),
            ) => {
                if *x < 0.0 {
                    return Err(unsupported());
                }
                let max = x.floor() as u32;
                rule.max_consecutive_bullish_candles = Some(
                    rule.max_consecutive_bullish_candles
                        .map_or(max, |current| current.min(max)),
                );
            }
            (FilterName::RsiDivergence, ComparisonOp::Eq, ActionValue::Flag(true)) => {
                rule.require_rsi_divergence = true;
            }
            (FilterName::HasLargeWick, ComparisonOp::Eq, ActionValue::Flag(true)) => {
                rule.require_large_wick = true;
            }
            (FilterName::VolumeSpike, ComparisonOp::Eq, ActionValue::Flag(true)) => {
                rule.require_volume_spike = true;
            }
            (FilterName::ProbabilityScore, ComparisonOp::Gt | ComparisonOp::Ge, ActionValue::Number(x)) => {
                self.min_probability_score = self.min_probability_score.max(x.min(100.0));
            }
            _ => return Err(unsupported()),
        }

        Ok(())
    }
}

fn tighten_floor(current: Option<f64>, proposed: f64) -> f64 {
    current.map_or(proposed, |c| c.max(proposed))
}

fn tighten_ceiling(current: Option<f64>, proposed: f64) -> f64 {
    current.map_or(proposed, |c| c.min(proposed))
}

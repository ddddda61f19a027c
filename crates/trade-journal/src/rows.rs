//! Internal row types with TEXT timestamps and tags, converted to domain types
//! on read.

use chrono::{DateTime, SecondsFormat, Utc};
use signal_core::{
    ActionItem, ConditionStat, FilterSensitivity, LearningReview, MarketSnapshot, TradeLevels,
    TradeOutcome, TradePlan, ValidationError,
};
use sqlx::FromRow;

use crate::error::Result;

/// Fixed-width RFC 3339 so text comparison in SQL follows time order.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            ValidationError::InvalidData(format!("{} is not a timestamp ({}): {}", field, raw, e))
                .into()
        })
}

fn to_u32(field: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ValidationError::InvalidData(format!("{} out of range: {}", field, value)).into())
}

#[derive(Debug, FromRow)]
pub(crate) struct SnapshotRow {
    pub id: i64,
    pub timestamp: String,
    pub session: String,
    pub htf_trend: String,
    pub htf_structure: String,
    pub key_resistance_level: f64,
    pub liquidity_event_type: String,
    pub has_large_wick: bool,
    pub consecutive_bullish_candles: i64,
    pub atr_value: f64,
    pub rsi_divergence: bool,
    pub vwap_distance: f64,
    pub volume_spike: bool,
    pub spread_value: f64,
    pub news_event_proximity_minutes: Option<i64>,
}

impl SnapshotRow {
    pub fn into_snapshot(self) -> Result<MarketSnapshot> {
        Ok(MarketSnapshot {
            id: Some(self.id),
            timestamp: parse_ts("timestamp", &self.timestamp)?,
            session: self.session.parse()?,
            htf_trend: self.htf_trend.parse()?,
            htf_structure: self.htf_structure,
            key_resistance_level: self.key_resistance_level,
            liquidity_event_type: self.liquidity_event_type.parse()?,
            has_large_wick: self.has_large_wick,
            consecutive_bullish_candles: to_u32(
                "consecutive_bullish_candles",
                self.consecutive_bullish_candles,
            )?,
            atr_value: self.atr_value,
            rsi_divergence: self.rsi_divergence,
            vwap_distance: self.vwap_distance,
            volume_spike: self.volume_spike,
            spread_value: self.spread_value,
            news_event_proximity_minutes: self.news_event_proximity_minutes,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PlanRow {
    pub id: i64,
    pub snapshot_id: i64,
    pub created_at: String,
    pub direction: String,
    pub entry_zone_start: f64,
    pub entry_zone_end: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub estimated_rr: f64,
    pub probability_score: f64,
    pub status: String,
    pub config_version: i64,
}

impl PlanRow {
    pub fn into_plan(self) -> Result<TradePlan> {
        Ok(TradePlan {
            id: Some(self.id),
            snapshot_id: Some(self.snapshot_id),
            created_at: parse_ts("created_at", &self.created_at)?,
            direction: self.direction.parse()?,
            levels: TradeLevels {
                entry_zone_start: self.entry_zone_start,
                entry_zone_end: self.entry_zone_end,
                stop_loss: self.stop_loss,
                tp1: self.tp1,
                tp2: self.tp2,
            },
            estimated_rr: self.estimated_rr,
            probability_score: self.probability_score,
            status: self.status.parse()?,
            config_version: self.config_version,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct OutcomeRow {
    pub id: i64,
    pub plan_id: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub outcome: String,
    pub realized_r_multiple: f64,
    pub pnl_percent: f64,
    pub comments: Option<String>,
    pub recorded_at: String,
}

impl OutcomeRow {
    pub fn into_outcome(self) -> Result<TradeOutcome> {
        Ok(TradeOutcome {
            id: Some(self.id),
            plan_id: self.plan_id,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            outcome: self.outcome.parse()?,
            realized_r_multiple: self.realized_r_multiple,
            pnl_percent: self.pnl_percent,
            comments: self.comments,
            recorded_at: parse_ts("recorded_at", &self.recorded_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ReviewRow {
    pub id: i64,
    pub review_date: String,
    pub window_start: String,
    pub window_end: String,
    pub sample_size: i64,
    pub low_confidence: bool,
    pub high_performing_conditions: String,
    pub loss_prone_conditions: String,
    pub strongest_filters: String,
    pub regime_notes: String,
    pub action_items: String,
}

impl ReviewRow {
    pub fn into_review(self) -> Result<LearningReview> {
        let high: Vec<ConditionStat> = serde_json::from_str(&self.high_performing_conditions)?;
        let loss: Vec<ConditionStat> = serde_json::from_str(&self.loss_prone_conditions)?;
        let filters: Vec<FilterSensitivity> = serde_json::from_str(&self.strongest_filters)?;
        let actions: Vec<ActionItem> = serde_json::from_str(&self.action_items)?;

        Ok(LearningReview {
            id: Some(self.id),
            review_date: parse_ts("review_date", &self.review_date)?,
            window_start: parse_ts("window_start", &self.window_start)?,
            window_end: parse_ts("window_end", &self.window_end)?,
            sample_size: to_u32("sample_size", self.sample_size)?,
            low_confidence: self.low_confidence,
            high_performing_conditions: high,
            loss_prone_conditions: loss,
            strongest_filters: filters,
            regime_notes: self.regime_notes,
            action_items: actions,
        })
    }
}

/// Flat row of the window join; columns are prefixed per table.
#[derive(Debug, FromRow)]
pub(crate) struct ClosedTradeRow {
    pub s_id: i64,
    pub s_timestamp: String,
    pub s_session: String,
    pub s_htf_trend: String,
    pub s_htf_structure: String,
    pub s_key_resistance_level: f64,
    pub s_liquidity_event_type: String,
    pub s_has_large_wick: bool,
    pub s_consecutive_bullish_candles: i64,
    pub s_atr_value: f64,
    pub s_rsi_divergence: bool,
    pub s_vwap_distance: f64,
    pub s_volume_spike: bool,
    pub s_spread_value: f64,
    pub s_news_event_proximity_minutes: Option<i64>,
    pub p_id: i64,
    pub p_created_at: String,
    pub p_direction: String,
    pub p_entry_zone_start: f64,
    pub p_entry_zone_end: f64,
    pub p_stop_loss: f64,
    pub p_tp1: f64,
    pub p_tp2: f64,
    pub p_estimated_rr: f64,
    pub p_probability_score: f64,
    pub p_status: String,
    pub p_config_version: i64,
    pub o_id: i64,
    pub o_entry_price: f64,
    pub o_exit_price: f64,
    pub o_outcome: String,
    pub o_realized_r_multiple: f64,
    pub o_pnl_percent: f64,
    pub o_comments: Option<String>,
    pub o_recorded_at: String,
}

impl ClosedTradeRow {
    pub fn into_closed_trade(self) -> Result<signal_core::ClosedTrade> {
        let snapshot = SnapshotRow {
            id: self.s_id,
            timestamp: self.s_timestamp,
            session: self.s_session,
            htf_trend: self.s_htf_trend,
            htf_structure: self.s_htf_structure,
            key_resistance_level: self.s_key_resistance_level,
            liquidity_event_type: self.s_liquidity_event_type,
            has_large_wick: self.s_has_large_wick,
            consecutive_bullish_candles: self.s_consecutive_bullish_candles,
            atr_value: self.s_atr_value,
            rsi_divergence: self.s_rsi_divergence,
            vwap_distance: self.s_vwap_distance,
            volume_spike: self.s_volume_spike,
            spread_value: self.s_spread_value,
            news_event_proximity_minutes: self.s_news_event_proximity_minutes,
        }
        .into_snapshot()?;

        let plan = PlanRow {
            id: self.p_id,
            snapshot_id: self.s_id,
            created_at: self.p_created_at,
            direction: self.p_direction,
            entry_zone_start: self.p_entry_zone_start,
            entry_zone_end: self.p_entry_zone_end,
            stop_loss: self.p_stop_loss,
            tp1: self.p_tp1,
            tp2: self.p_tp2,
            estimated_rr: self.p_estimated_rr,
            probability_score: self.p_probability_score,
            status: self.p_status,
            config_version: self.p_config_version,
        }
        .into_plan()?;

        let outcome = OutcomeRow {
            id: self.o_id,
            plan_id: self.p_id,
            entry_price: self.o_entry_price,
            exit_price: self.o_exit_price,
            outcome: self.o_outcome,
            realized_r_multiple: self.o_realized_r_multiple,
            pnl_percent: self.o_pnl_percent,
            comments: self.o_comments,
            recorded_at: self.o_recorded_at,
        }
        .into_outcome()?;

        Ok(signal_core::ClosedTrade {
            snapshot,
            plan,
            outcome,
        })
    }
}

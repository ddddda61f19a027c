use signal_core::{Direction, HtfTrend, LevelModel, MarketSnapshot, ScoreModel, TradeLevels};

use crate::config::{LevelParams, ScoreWeights};

/// Additive rule score. Each present feature contributes its weight and the
/// total is clamped to 0..=100.
#[derive(Debug, Clone, Default)]
pub struct RuleScoreModel {
    weights: ScoreWeights,
}

impl RuleScoreModel {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }
}

impl ScoreModel for RuleScoreModel {
    fn score(&self, snapshot: &MarketSnapshot) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        match snapshot.htf_trend {
            HtfTrend::Bearish => score += w.bearish_trend,
            HtfTrend::Ranging => score += w.ranging_trend,
            HtfTrend::Bullish => {}
        }
        if snapshot.liquidity_event_type.is_event() {
            score += w.liquidity_event;
        }
        if snapshot.rsi_divergence {
            score += w.rsi_divergence;
        }
        if snapshot.has_large_wick {
            score += w.large_wick;
        }
        if snapshot.volume_spike {
            score += w.volume_spike;
        }
        if snapshot.vwap_distance.abs() >= w.vwap_stretch_distance {
            score += w.vwap_stretch;
        }

        score.clamp(0.0, 100.0)
    }

    fn name(&self) -> &str {
        "rule_score"
    }
}

/// Places the stop beyond the key level by an ATR buffer and the targets at
/// fixed R multiples of the stop distance from the entry midpoint.
#[derive(Debug, Clone, Default)]
pub struct AtrLevelModel {
    params: LevelParams,
}

impl AtrLevelModel {
    pub fn new(params: LevelParams) -> Self {
        Self { params }
    }
}

impl LevelModel for AtrLevelModel {
    fn levels(&self, snapshot: &MarketSnapshot, direction: Direction) -> TradeLevels {
        let p = &self.params;
        let key = snapshot.key_resistance_level;
        let atr = snapshot.atr_value;

        match direction {
            Direction::Short => {
                let stop_loss = key + p.stop_buffer_atr * atr;
                let entry_zone_end = key - p.entry_offset_atr * atr;
                let entry_zone_start = entry_zone_end - p.entry_zone_width_atr * atr;
                let entry = (entry_zone_start + entry_zone_end) / 2.0;
                let risk = stop_loss - entry;
                TradeLevels {
                    entry_zone_start,
                    entry_zone_end,
                    stop_loss,
                    tp1: entry - p.tp1_r * risk,
                    tp2: entry - p.tp2_r * risk,
                }
            }
            Direction::Long => {
                let stop_loss = key - p.stop_buffer_atr * atr;
                let entry_zone_start = key + p.entry_offset_atr * atr;
                let entry_zone_end = entry_zone_start + p.entry_zone_width_atr * atr;
                let entry = (entry_zone_start + entry_zone_end) / 2.0;
                let risk = entry - stop_loss;
                TradeLevels {
                    entry_zone_start,
                    entry_zone_end,
                    stop_loss,
                    tp1: entry + p.tp1_r * risk,
                    tp2: entry + p.tp2_r * risk,
                }
            }
        }
    }

    fn name(&self) -> &str {
        "atr_levels"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use signal_core::{LiquidityEvent, Session};

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            id: None,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap(),
            session: Session::London,
            htf_trend: HtfTrend::Bearish,
            htf_structure: "LH".to_string(),
            key_resistance_level: 2040.0,
            liquidity_event_type: LiquidityEvent::LocalHighSweep,
            has_large_wick: true,
            consecutive_bullish_candles: 2,
            atr_value: 4.0,
            rsi_divergence: true,
            vwap_distance: 2.0,
            volume_spike: false,
            spread_value: 0.3,
            news_event_proximity_minutes: None,
        }
    }

    #[test]
    fn test_rule_score_sums_weights() {
        let model = RuleScoreModel::default();
        // bearish 30 + liquidity 25 + rsi 10 + wick 10
        assert_eq!(model.score(&snapshot()), 75.0);

        let mut snap = snapshot();
        snap.vwap_distance = -6.0;
        snap.volume_spike = true;
        assert_eq!(model.score(&snap), 100.0);
    }

    #[test]
    fn test_rule_score_is_clamped() {
        let model = RuleScoreModel::new(ScoreWeights {
            bearish_trend: 90.0,
            liquidity_event: 90.0,
            ..ScoreWeights::default()
        });
        assert_eq!(model.score(&snapshot()), 100.0);

        let model = RuleScoreModel::new(ScoreWeights {
            bearish_trend: -200.0,
            ..ScoreWeights::default()
        });
        assert_eq!(model.score(&snapshot()), 0.0);
    }

    #[test]
    fn test_short_levels_geometry() {
        let levels = AtrLevelModel::default().levels(&snapshot(), Direction::Short);
        assert_eq!(levels.stop_loss, 2041.0);
        assert_eq!(levels.entry_zone_end, 2039.0);
        assert_eq!(levels.entry_zone_start, 2037.0);
        // entry 2038, risk 3
        assert_eq!(levels.tp1, 2032.0);
        assert_eq!(levels.tp2, 2029.0);
        assert!(levels.is_well_formed(Direction::Short));
        assert!((levels.risk_reward() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_levels_mirror() {
        let levels = AtrLevelModel::default().levels(&snapshot(), Direction::Long);
        assert!(levels.is_well_formed(Direction::Long));
        assert!(levels.stop_loss < levels.entry_zone_start);
        assert!((levels.risk_reward() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_atr_collapses_levels() {
        let mut snap = snapshot();
        snap.atr_value = 0.0;
        let levels = AtrLevelModel::default().levels(&snap, Direction::Short);
        assert!(!levels.is_well_formed(Direction::Short));
        assert!(!levels.risk_reward().is_finite());
    }
}

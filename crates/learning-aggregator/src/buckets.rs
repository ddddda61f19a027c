//! Discretization of snapshot features into review conditions.

use signal_core::{ClosedTrade, Dimension};

/// A condition label plus, for numeric dimensions, the half-open
/// `[lower, upper)` range it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub label: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bucket {
    fn label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            lower: None,
            upper: None,
        }
    }

    /// Lowest bucket of a numeric dimension
    pub fn is_floor(&self) -> bool {
        self.lower.is_none() && self.upper.is_some()
    }

    /// Highest bucket of a numeric dimension
    pub fn is_ceiling(&self) -> bool {
        self.lower.is_some() && self.upper.is_none()
    }
}

pub const VWAP_EDGES: [f64; 3] = [0.0, 5.0, 10.0];
pub const NEWS_EDGES: [f64; 2] = [30.0, 60.0];
pub const SPREAD_EDGES: [f64; 2] = [0.3, 0.5];
pub const CANDLE_EDGES: [f64; 2] = [3.0, 5.0];
pub const SCORE_EDGES: [f64; 2] = [75.0, 85.0];

pub const NO_NEWS: &str = "none";

fn numeric(value: f64, edges: &[f64]) -> Bucket {
    let idx = edges.iter().take_while(|edge| value >= **edge).count();
    let lower = idx.checked_sub(1).map(|i| edges[i]);
    let upper = edges.get(idx).copied();

    let label = match (lower, upper) {
        (None, Some(u)) => format!("< {}", u),
        (Some(l), None) => format!(">= {}", l),
        (Some(l), Some(u)) => format!("{}-{}", l, u),
        (None, None) => "all".to_string(),
    };

    Bucket {
        label,
        lower,
        upper,
    }
}

fn flag(value: bool) -> Bucket {
    Bucket::label(if value { "true" } else { "false" })
}

pub fn bucket(dimension: Dimension, trade: &ClosedTrade) -> Bucket {
    let s = &trade.snapshot;
    match dimension {
        Dimension::Session => Bucket::label(s.session.as_str()),
        Dimension::HtfTrend => Bucket::label(s.htf_trend.as_str()),
        Dimension::HtfStructure => {
            let structure = s.htf_structure.trim();
            if structure.is_empty() {
                Bucket::label("UNLABELED")
            } else {
                Bucket::label(structure.to_uppercase())
            }
        }
        Dimension::LiquidityEvent => Bucket::label(s.liquidity_event_type.as_str()),
        Dimension::VwapDistance => numeric(s.vwap_distance, &VWAP_EDGES),
        Dimension::NewsProximity => match s.news_event_proximity_minutes {
            Some(minutes) => numeric(minutes as f64, &NEWS_EDGES),
            None => Bucket::label(NO_NEWS),
        },
        Dimension::Spread => numeric(s.spread_value, &SPREAD_EDGES),
        Dimension::ConsecutiveCandles => {
            numeric(s.consecutive_bullish_candles as f64, &CANDLE_EDGES)
        }
        Dimension::RsiDivergence => flag(s.rsi_divergence),
        Dimension::LargeWick => flag(s.has_large_wick),
        Dimension::VolumeSpike => flag(s.volume_spike),
        Dimension::ProbabilityScore => numeric(trade.plan.probability_score, &SCORE_EDGES),
    }
}

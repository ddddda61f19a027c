//! Raw market observation as supplied by the price/feature feed.
//!
//! Enum-like fields arrive as free-form strings and are classified here;
//! anything that cannot be classified is a `ValidationError`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, ensure_non_negative, ValidationError};
use crate::types::{HtfTrend, LiquidityEvent, MarketSnapshot, Session};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketObservation {
    pub timestamp: Option<DateTime<Utc>>,
    /// Left empty when the caller wants the session derived from the clock
    #[serde(default)]
    pub session: Option<String>,
    pub htf_trend: String,
    #[serde(default)]
    pub htf_structure: String,
    pub key_resistance_level: f64,
    #[serde(default)]
    pub liquidity_event_type: Option<String>,
    #[serde(default)]
    pub has_large_wick: bool,
    #[serde(default)]
    pub consecutive_bullish_candles: i64,
    pub atr_value: f64,
    #[serde(default)]
    pub rsi_divergence: bool,
    #[serde(default)]
    pub vwap_distance: f64,
    #[serde(default)]
    pub volume_spike: bool,
    #[serde(default)]
    pub spread_value: f64,
    #[serde(default)]
    pub news_event_proximity_minutes: Option<i64>,
}

impl MarketObservation {
    /// Classify and range-check every field, producing an unrecorded snapshot.
    pub fn validate(&self) -> Result<MarketSnapshot, ValidationError> {
        let timestamp = self.timestamp.ok_or(ValidationError::MissingTimestamp)?;

        let session: Session = match self.session.as_deref() {
            Some(raw) => raw.parse()?,
            None => return Err(ValidationError::UnknownSession(String::new())),
        };
        let htf_trend: HtfTrend = self.htf_trend.parse()?;
        let liquidity_event_type: LiquidityEvent = self
            .liquidity_event_type
            .as_deref()
            .unwrap_or("")
            .parse()?;

        if self.consecutive_bullish_candles < 0 {
            return Err(ValidationError::Negative {
                field: "consecutive_bullish_candles",
                value: self.consecutive_bullish_candles as f64,
            });
        }
        let consecutive_bullish_candles = u32::try_from(self.consecutive_bullish_candles)
            .map_err(|_| {
                ValidationError::InvalidData(format!(
                    "consecutive_bullish_candles out of range: {}",
                    self.consecutive_bullish_candles
                ))
            })?;

        if let Some(minutes) = self.news_event_proximity_minutes {
            if minutes < 0 {
                return Err(ValidationError::Negative {
                    field: "news_event_proximity_minutes",
                    value: minutes as f64,
                });
            }
        }

        Ok(MarketSnapshot {
            id: None,
            timestamp,
            session,
            htf_trend,
            htf_structure: self.htf_structure.trim().to_string(),
            key_resistance_level: ensure_non_negative(
                "key_resistance_level",
                self.key_resistance_level,
            )?,
            liquidity_event_type,
            has_large_wick: self.has_large_wick,
            consecutive_bullish_candles,
            atr_value: ensure_non_negative("atr_value", self.atr_value)?,
            rsi_divergence: self.rsi_divergence,
            vwap_distance: ensure_finite("vwap_distance", self.vwap_distance)?,
            volume_spike: self.volume_spike,
            spread_value: ensure_non_negative("spread_value", self.spread_value)?,
            news_event_proximity_minutes: self.news_event_proximity_minutes,
        })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// Normalizes a free-form tag ("New York", "new-york") to `NEW_YORK` form.
fn normalize_tag(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '/' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Named trading-hours window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Session {
    London,
    NewYork,
    Asian,
    Other,
}

impl Session {
    pub const ALL: [Session; 4] = [
        Session::London,
        Session::NewYork,
        Session::Asian,
        Session::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::London => "LONDON",
            Session::NewYork => "NEW_YORK",
            Session::Asian => "ASIAN",
            Session::Other => "OTHER",
        }
    }
}

impl FromStr for Session {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_tag(s).as_str() {
            "LONDON" => Ok(Session::London),
            "NEW_YORK" | "NEWYORK" | "NY" => Ok(Session::NewYork),
            "ASIAN" | "ASIA" | "TOKYO" => Ok(Session::Asian),
            "OTHER" => Ok(Session::Other),
            _ => Err(ValidationError::UnknownSession(s.to_string())),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Higher-timeframe trend context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HtfTrend {
    Bullish,
    Bearish,
    Ranging,
}

impl HtfTrend {
    pub const ALL: [HtfTrend; 3] = [HtfTrend::Bullish, HtfTrend::Bearish, HtfTrend::Ranging];

    pub fn as_str(&self) -> &'static str {
        match self {
            HtfTrend::Bullish => "BULLISH",
            HtfTrend::Bearish => "BEARISH",
            HtfTrend::Ranging => "RANGING",
        }
    }
}

impl FromStr for HtfTrend {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_tag(s).as_str() {
            "BULLISH" => Ok(HtfTrend::Bullish),
            "BEARISH" => Ok(HtfTrend::Bearish),
            "RANGING" | "RANGE" | "NEUTRAL" => Ok(HtfTrend::Ranging),
            _ => Err(ValidationError::UnknownTrend(s.to_string())),
        }
    }
}

impl fmt::Display for HtfTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected liquidity pattern used as a structural filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityEvent {
    None,
    LocalHighSweep,
    AsianHighSweep,
    SessionHighSweep,
    EqualHighsSweep,
    StopHunt,
}

impl LiquidityEvent {
    pub const ALL: [LiquidityEvent; 6] = [
        LiquidityEvent::None,
        LiquidityEvent::LocalHighSweep,
        LiquidityEvent::AsianHighSweep,
        LiquidityEvent::SessionHighSweep,
        LiquidityEvent::EqualHighsSweep,
        LiquidityEvent::StopHunt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityEvent::None => "NONE",
            LiquidityEvent::LocalHighSweep => "LOCAL_HIGH_SWEEP",
            LiquidityEvent::AsianHighSweep => "ASIAN_HIGH_SWEEP",
            LiquidityEvent::SessionHighSweep => "SESSION_HIGH_SWEEP",
            LiquidityEvent::EqualHighsSweep => "EQUAL_HIGHS_SWEEP",
            LiquidityEvent::StopHunt => "STOP_HUNT",
        }
    }

    pub fn is_event(&self) -> bool {
        !matches!(self, LiquidityEvent::None)
    }
}

impl FromStr for LiquidityEvent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_tag(s).as_str() {
            "" | "NONE" | "NULL" => Ok(LiquidityEvent::None),
            "LOCAL_HIGH_SWEEP" => Ok(LiquidityEvent::LocalHighSweep),
            "ASIAN_HIGH_SWEEP" | "ASIAN_SWEEP" => Ok(LiquidityEvent::AsianHighSweep),
            "SESSION_HIGH_SWEEP" | "SESSION_SWEEP" => Ok(LiquidityEvent::SessionHighSweep),
            "EQUAL_HIGHS_SWEEP" | "EQUAL_HIGHS" => Ok(LiquidityEvent::EqualHighsSweep),
            "STOP_HUNT" => Ok(LiquidityEvent::StopHunt),
            _ => Err(ValidationError::UnknownLiquidityEvent(s.to_string())),
        }
    }
}

impl fmt::Display for LiquidityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade direction. The instrument is traded with a short bias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Short,
    Long,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Short => "SHORT",
            Direction::Long => "LONG",
        }
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_tag(s).as_str() {
            "SHORT" | "SELL" => Ok(Direction::Short),
            "LONG" | "BUY" => Ok(Direction::Long),
            _ => Err(ValidationError::UnknownDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade plan lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Pending,
    Executed,
    Cancelled,
    Ignored,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "PENDING",
            PlanStatus::Executed => "EXECUTED",
            PlanStatus::Cancelled => "CANCELLED",
            PlanStatus::Ignored => "IGNORED",
        }
    }

    /// Only a pending plan can move, and only to one of the three terminal states.
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (
                PlanStatus::Pending,
                PlanStatus::Executed | PlanStatus::Cancelled | PlanStatus::Ignored
            )
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PlanStatus::Pending)
    }
}

impl FromStr for PlanStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_tag(s).as_str() {
            "PENDING" => Ok(PlanStatus::Pending),
            "EXECUTED" => Ok(PlanStatus::Executed),
            "CANCELLED" | "CANCELED" => Ok(PlanStatus::Cancelled),
            "IGNORED" => Ok(PlanStatus::Ignored),
            _ => Err(ValidationError::UnknownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Realized result category of an executed plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCategory {
    Win,
    Loss,
    BreakEven,
}

impl OutcomeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeCategory::Win => "WIN",
            OutcomeCategory::Loss => "LOSS",
            OutcomeCategory::BreakEven => "BREAK_EVEN",
        }
    }

    /// Whether a realized R-multiple is consistent with this category.
    /// Break-even accepts |r| within `breakeven_band`.
    pub fn agrees_with(&self, r_multiple: f64, breakeven_band: f64) -> bool {
        if !r_multiple.is_finite() {
            return false;
        }
        match self {
            OutcomeCategory::Win => r_multiple > 0.0,
            OutcomeCategory::Loss => r_multiple < 0.0,
            OutcomeCategory::BreakEven => r_multiple.abs() <= breakeven_band.abs(),
        }
    }
}

impl FromStr for OutcomeCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_tag(s).as_str() {
            "WIN" => Ok(OutcomeCategory::Win),
            "LOSS" => Ok(OutcomeCategory::Loss),
            "BREAK_EVEN" | "BREAKEVEN" | "BE" => Ok(OutcomeCategory::BreakEven),
            _ => Err(ValidationError::UnknownOutcome(s.to_string())),
        }
    }
}

impl fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated point-in-time market observation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub session: Session,
    pub htf_trend: HtfTrend,
    pub htf_structure: String,
    pub key_resistance_level: f64,
    pub liquidity_event_type: LiquidityEvent,
    pub has_large_wick: bool,
    pub consecutive_bullish_candles: u32,
    pub atr_value: f64,
    pub rsi_divergence: bool,
    pub vwap_distance: f64,
    pub volume_spike: bool,
    pub spread_value: f64,
    /// `None` means no scheduled high-impact event nearby
    pub news_event_proximity_minutes: Option<i64>,
}

/// Price levels produced by a level model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub entry_zone_start: f64,
    pub entry_zone_end: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
}

impl TradeLevels {
    /// Midpoint of the entry zone, used as the reference entry for R:R.
    pub fn entry_reference(&self) -> f64 {
        (self.entry_zone_start + self.entry_zone_end) / 2.0
    }

    /// |tp1 - entry| / |entry - sl|. NaN or infinite when the stop sits on the entry.
    pub fn risk_reward(&self) -> f64 {
        let entry = self.entry_reference();
        (self.tp1 - entry).abs() / (entry - self.stop_loss).abs()
    }

    /// Stop beyond the entry zone on the losing side, targets ordered on the winning side.
    pub fn is_well_formed(&self, direction: Direction) -> bool {
        let values = [
            self.entry_zone_start,
            self.entry_zone_end,
            self.stop_loss,
            self.tp1,
            self.tp2,
        ];
        if values.iter().any(|v| !v.is_finite()) || self.entry_zone_start > self.entry_zone_end {
            return false;
        }
        match direction {
            Direction::Short => {
                self.stop_loss > self.entry_zone_end
                    && self.tp1 < self.entry_zone_start
                    && self.tp2 < self.tp1
            }
            Direction::Long => {
                self.stop_loss < self.entry_zone_start
                    && self.tp1 > self.entry_zone_end
                    && self.tp2 > self.tp1
            }
        }
    }
}

/// A plan emitted by the setup evaluator for exactly one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub id: Option<i64>,
    pub snapshot_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub direction: Direction,
    #[serde(flatten)]
    pub levels: TradeLevels,
    pub estimated_rr: f64,
    pub probability_score: f64,
    pub status: PlanStatus,
    /// Evaluator configuration version that produced this plan
    pub config_version: i64,
}

/// Realized result reported for an executed plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub entry_price: f64,
    pub exit_price: f64,
    pub outcome: OutcomeCategory,
    pub realized_r_multiple: f64,
    pub pnl_percent: f64,
    #[serde(default)]
    pub comments: Option<String>,
}

/// Persisted outcome row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub id: Option<i64>,
    pub plan_id: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub outcome: OutcomeCategory,
    pub realized_r_multiple: f64,
    pub pnl_percent: f64,
    pub comments: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Snapshot feature dimension the learning review conditions on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Session,
    HtfTrend,
    HtfStructure,
    LiquidityEvent,
    VwapDistance,
    NewsProximity,
    Spread,
    ConsecutiveCandles,
    RsiDivergence,
    LargeWick,
    VolumeSpike,
    ProbabilityScore,
}

impl Dimension {
    pub const ALL: [Dimension; 12] = [
        Dimension::Session,
        Dimension::HtfTrend,
        Dimension::HtfStructure,
        Dimension::LiquidityEvent,
        Dimension::VwapDistance,
        Dimension::NewsProximity,
        Dimension::Spread,
        Dimension::ConsecutiveCandles,
        Dimension::RsiDivergence,
        Dimension::LargeWick,
        Dimension::VolumeSpike,
        Dimension::ProbabilityScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Session => "session",
            Dimension::HtfTrend => "htf_trend",
            Dimension::HtfStructure => "htf_structure",
            Dimension::LiquidityEvent => "liquidity_event_type",
            Dimension::VwapDistance => "vwap_distance",
            Dimension::NewsProximity => "news_event_proximity_minutes",
            Dimension::Spread => "spread_value",
            Dimension::ConsecutiveCandles => "consecutive_bullish_candles",
            Dimension::RsiDivergence => "rsi_divergence",
            Dimension::LargeWick => "has_large_wick",
            Dimension::VolumeSpike => "volume_spike",
            Dimension::ProbabilityScore => "probability_score",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Win-rate conditioned on one feature value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionStat {
    pub dimension: Dimension,
    pub condition: String,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    /// Conditional win-rate minus the overall win-rate
    pub edge: f64,
    pub avg_r_multiple: f64,
}

/// One gating predicate of the evaluator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePredicate {
    SessionWindow,
    NewsProximity,
    LiquidityEvent,
    TrendAlignment,
    Confirmation,
    VwapBounds,
    SpreadCeiling,
    CandleCeiling,
    RequiredFlags,
    ProbabilityThreshold,
}

impl GatePredicate {
    pub const ALL: [GatePredicate; 10] = [
        GatePredicate::SessionWindow,
        GatePredicate::NewsProximity,
        GatePredicate::LiquidityEvent,
        GatePredicate::TrendAlignment,
        GatePredicate::Confirmation,
        GatePredicate::VwapBounds,
        GatePredicate::SpreadCeiling,
        GatePredicate::CandleCeiling,
        GatePredicate::RequiredFlags,
        GatePredicate::ProbabilityThreshold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatePredicate::SessionWindow => "session_window",
            GatePredicate::NewsProximity => "news_proximity",
            GatePredicate::LiquidityEvent => "liquidity_event",
            GatePredicate::TrendAlignment => "trend_alignment",
            GatePredicate::Confirmation => "confirmation",
            GatePredicate::VwapBounds => "vwap_bounds",
            GatePredicate::SpreadCeiling => "spread_ceiling",
            GatePredicate::CandleCeiling => "candle_ceiling",
            GatePredicate::RequiredFlags => "required_flags",
            GatePredicate::ProbabilityThreshold => "probability_threshold",
        }
    }
}

impl fmt::Display for GatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much one gating predicate separates outcomes inside a review window.
///
/// Every trade in a window already passed every gate, so the predicate is
/// judged by its margin: trades that cleared it with room to spare versus
/// trades that only just made it through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSensitivity {
    pub predicate: GatePredicate,
    /// Win-rate of trades clear of the predicate's margin
    pub win_rate_clear: f64,
    /// Win-rate of trades inside the predicate's margin
    pub win_rate_marginal: f64,
    pub avg_r_clear: f64,
    pub avg_r_marginal: f64,
    /// `win_rate_clear - win_rate_marginal`
    pub sensitivity: f64,
    pub clear_trades: u32,
    pub marginal_trades: u32,
}

/// Evaluator setting an action item targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterName {
    Session,
    HtfTrend,
    LiquidityEventType,
    VwapDistance,
    NewsEventProximityMinutes,
    SpreadValue,
    ConsecutiveBullishCandles,
    RsiDivergence,
    HasLargeWick,
    VolumeSpike,
    ProbabilityScore,
}

impl FilterName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterName::Session => "session",
            FilterName::HtfTrend => "htf_trend",
            FilterName::LiquidityEventType => "liquidity_event_type",
            FilterName::VwapDistance => "vwap_distance",
            FilterName::NewsEventProximityMinutes => "news_event_proximity_minutes",
            FilterName::SpreadValue => "spread_value",
            FilterName::ConsecutiveBullishCandles => "consecutive_bullish_candles",
            FilterName::RsiDivergence => "rsi_divergence",
            FilterName::HasLargeWick => "has_large_wick",
            FilterName::VolumeSpike => "volume_spike",
            FilterName::ProbabilityScore => "probability_score",
        }
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    Flag(bool),
    Number(f64),
    Label(String),
}

impl fmt::Display for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionValue::Flag(b) => write!(f, "{}", b),
            ActionValue::Number(n) => write!(f, "{:.1}", n),
            ActionValue::Label(s) => f.write_str(s),
        }
    }
}

/// Proposed, human-reviewable change to a gating threshold,
/// e.g. `vwap_distance >= 5.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub filter: FilterName,
    pub operator: ComparisonOp,
    pub value: ActionValue,
    pub rationale: String,
}

impl fmt::Display for ActionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.filter, self.operator, self.value)
    }
}

/// An outcome joined with the plan and snapshot that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub snapshot: MarketSnapshot,
    pub plan: TradePlan,
    pub outcome: TradeOutcome,
}

/// Periodic self-learning checkpoint. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningReview {
    pub id: Option<i64>,
    pub review_date: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub sample_size: u32,
    pub low_confidence: bool,
    pub high_performing_conditions: Vec<ConditionStat>,
    pub loss_prone_conditions: Vec<ConditionStat>,
    pub strongest_filters: Vec<FilterSensitivity>,
    pub regime_notes: String,
    pub action_items: Vec<ActionItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_parsing_accepts_feed_spellings() {
        assert_eq!("London".parse::<Session>().unwrap(), Session::London);
        assert_eq!("NEW_YORK".parse::<Session>().unwrap(), Session::NewYork);
        assert_eq!("new york".parse::<Session>().unwrap(), Session::NewYork);
        assert_eq!("Asia".parse::<Session>().unwrap(), Session::Asian);
        assert!(matches!(
            "Sydney".parse::<Session>(),
            Err(ValidationError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_liquidity_event_aliases() {
        assert_eq!(
            "Local High Sweep".parse::<LiquidityEvent>().unwrap(),
            LiquidityEvent::LocalHighSweep
        );
        assert_eq!(
            "Asian Sweep".parse::<LiquidityEvent>().unwrap(),
            LiquidityEvent::AsianHighSweep
        );
        assert_eq!("".parse::<LiquidityEvent>().unwrap(), LiquidityEvent::None);
        assert!(!LiquidityEvent::None.is_event());
    }

    #[test]
    fn test_status_transitions() {
        assert!(PlanStatus::Pending.can_transition_to(PlanStatus::Executed));
        assert!(PlanStatus::Pending.can_transition_to(PlanStatus::Cancelled));
        assert!(PlanStatus::Pending.can_transition_to(PlanStatus::Ignored));
        assert!(!PlanStatus::Pending.can_transition_to(PlanStatus::Pending));
        assert!(!PlanStatus::Executed.can_transition_to(PlanStatus::Pending));
        assert!(!PlanStatus::Cancelled.can_transition_to(PlanStatus::Executed));
        assert!(!PlanStatus::Ignored.can_transition_to(PlanStatus::Cancelled));
    }

    #[test]
    fn test_outcome_sign_agreement() {
        assert!(OutcomeCategory::Win.agrees_with(1.8, 0.1));
        assert!(!OutcomeCategory::Win.agrees_with(-0.5, 0.1));
        assert!(!OutcomeCategory::Win.agrees_with(0.0, 0.1));
        assert!(OutcomeCategory::Loss.agrees_with(-1.0, 0.1));
        assert!(!OutcomeCategory::Loss.agrees_with(0.2, 0.1));
        assert!(OutcomeCategory::BreakEven.agrees_with(0.05, 0.1));
        assert!(OutcomeCategory::BreakEven.agrees_with(0.0, 0.1));
        assert!(!OutcomeCategory::BreakEven.agrees_with(-0.4, 0.1));
        assert!(!OutcomeCategory::Win.agrees_with(f64::NAN, 0.1));
    }

    #[test]
    fn test_short_levels_geometry_and_rr() {
        let levels = TradeLevels {
            entry_zone_start: 2000.0,
            entry_zone_end: 2002.0,
            stop_loss: 2006.0,
            tp1: 1991.0,
            tp2: 1986.0,
        };
        assert!(levels.is_well_formed(Direction::Short));
        assert!(!levels.is_well_formed(Direction::Long));
        // entry 2001, risk 5, reward 10
        assert!((levels.risk_reward() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_on_entry_is_degenerate() {
        let levels = TradeLevels {
            entry_zone_start: 2000.0,
            entry_zone_end: 2000.0,
            stop_loss: 2000.0,
            tp1: 1990.0,
            tp2: 1980.0,
        };
        assert!(!levels.risk_reward().is_finite());
        assert!(!levels.is_well_formed(Direction::Short));
    }

    #[test]
    fn test_action_item_display() {
        let item = ActionItem {
            filter: FilterName::VwapDistance,
            operator: ComparisonOp::Gt,
            value: ActionValue::Number(10.0),
            rationale: String::new(),
        };
        assert_eq!(item.to_string(), "vwap_distance > 10.0");

        let json = serde_json::to_string(&item).unwrap();
        let back: ActionItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use setup_evaluator::EvaluatorConfig;
use signal_core::{
    ActionItem, ActionValue, ClosedTrade, ComparisonOp, ConditionStat, Dimension, Direction,
    FilterName, FilterSensitivity, GatePredicate, HtfTrend, LearningReview, OutcomeCategory,
};

use crate::buckets::{bucket, Bucket, NO_NEWS};

pub const LOW_CONFIDENCE_NOTE: &str = "NO STRUCTURAL CONCLUSIONS - SAMPLE TOO SMALL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSettings {
    /// Below this many outcomes the review is low-confidence
    pub min_sample: u32,
    /// Required distance between a conditional and the overall win-rate
    pub win_rate_margin: f64,
    /// Minimum trades behind a condition before it is reported
    pub min_support: u32,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            min_sample: 10,
            win_rate_margin: 0.15,
            min_support: 3,
        }
    }
}

/// Running counts for a group of trades. Break-evens count as trades but
/// belong to neither the win nor the loss bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub r_sum: f64,
}

impl Tally {
    pub fn add(&mut self, trade: &ClosedTrade) {
        self.trades += 1;
        self.r_sum += trade.outcome.realized_r_multiple;
        match trade.outcome.outcome {
            OutcomeCategory::Win => self.wins += 1,
            OutcomeCategory::Loss => self.losses += 1,
            OutcomeCategory::BreakEven => {}
        }
    }

    pub fn decided(&self) -> u32 {
        self.wins + self.losses
    }

    /// wins / (wins + losses); 0 when nothing was decided
    pub fn win_rate(&self) -> f64 {
        match self.decided() {
            0 => 0.0,
            n => self.wins as f64 / n as f64,
        }
    }

    pub fn avg_r(&self) -> f64 {
        match self.trades {
            0 => 0.0,
            n => self.r_sum / n as f64,
        }
    }

    fn of<'a>(trades: impl IntoIterator<Item = &'a ClosedTrade>) -> Self {
        let mut tally = Self::default();
        for trade in trades {
            tally.add(trade);
        }
        tally
    }
}

/// Computes learning reviews from a windowed sample. Holds no state and never
/// touches the evaluator configuration it is given.
#[derive(Debug, Clone, Default)]
pub struct LearningAggregator {
    settings: ReviewSettings,
}

impl LearningAggregator {
    pub fn new(settings: ReviewSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    pub fn review(
        &self,
        sample: &[ClosedTrade],
        config: &EvaluatorConfig,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        review_date: DateTime<Utc>,
    ) -> LearningReview {
        let sample_size = sample.len() as u32;

        if sample_size < self.settings.min_sample {
            tracing::info!(
                sample_size,
                min_sample = self.settings.min_sample,
                "Review sample below minimum, low confidence"
            );
            return LearningReview {
                id: None,
                review_date,
                window_start,
                window_end,
                sample_size,
                low_confidence: true,
                high_performing_conditions: Vec::new(),
                loss_prone_conditions: Vec::new(),
                strongest_filters: Vec::new(),
                regime_notes: format!(
                    "{} ({} of {} required trades)",
                    LOW_CONFIDENCE_NOTE, sample_size, self.settings.min_sample
                ),
                action_items: Vec::new(),
            };
        }

        let overall = Tally::of(sample);
        let (high, loss) = self.conditions(sample, &overall);
        let action_items = derive_action_items(&loss, overall.win_rate());
        let strongest_filters = filter_sensitivity(sample, config, self.settings.min_support);

        tracing::info!(
            sample_size,
            win_rate = overall.win_rate(),
            high_performing = high.len(),
            loss_prone = loss.len(),
            action_items = action_items.len(),
            "Learning review computed"
        );

        LearningReview {
            id: None,
            review_date,
            window_start,
            window_end,
            sample_size,
            low_confidence: false,
            high_performing_conditions: high.into_iter().map(|(stat, _)| stat).collect(),
            loss_prone_conditions: loss.iter().map(|(stat, _)| stat.clone()).collect(),
            strongest_filters,
            regime_notes: regime_notes(sample, &overall),
            action_items,
        }
    }

    fn conditions(
        &self,
        sample: &[ClosedTrade],
        overall: &Tally,
    ) -> (Vec<(ConditionStat, Bucket)>, Vec<(ConditionStat, Bucket)>) {
        let mut groups: BTreeMap<(Dimension, String), (Bucket, Tally)> = BTreeMap::new();
        for trade in sample {
            for dimension in Dimension::ALL {
                let b = bucket(dimension, trade);
                groups
                    .entry((dimension, b.label.clone()))
                    .or_insert_with(|| (b, Tally::default()))
                    .1
                    .add(trade);
            }
        }

        let base = overall.win_rate();
        let margin = self.settings.win_rate_margin;
        let mut high = Vec::new();
        let mut loss = Vec::new();

        for ((dimension, condition), (b, tally)) in groups {
            if tally.trades < self.settings.min_support || tally.decided() == 0 {
                continue;
            }
            let win_rate = tally.win_rate();
            let stat = ConditionStat {
                dimension,
                condition,
                trades: tally.trades,
                wins: tally.wins,
                losses: tally.losses,
                win_rate,
                edge: win_rate - base,
                avg_r_multiple: tally.avg_r(),
            };
            if win_rate >= base + margin {
                high.push((stat, b));
            } else if win_rate <= base - margin {
                loss.push((stat, b));
            }
        }

        // strongest first; BTreeMap iteration already fixed the tie order
        high.sort_by(|a, b| b.0.edge.total_cmp(&a.0.edge));
        loss.sort_by(|a, b| a.0.edge.total_cmp(&b.0.edge));
        (high, loss)
    }
}

/// Map loss-prone conditions onto threshold changes the evaluator understands.
fn derive_action_items(loss: &[(ConditionStat, Bucket)], base: f64) -> Vec<ActionItem> {
    let mut items = Vec::new();

    for (stat, b) in loss {
        let rationale = format!(
            "{} {} won {:.0}% of {} trades vs {:.0}% overall (avg {:+.2}R)",
            stat.dimension,
            stat.condition,
            stat.win_rate * 100.0,
            stat.trades,
            base * 100.0,
            stat.avg_r_multiple
        );

        let proposal = match stat.dimension {
            Dimension::Session => Some((
                FilterName::Session,
                ComparisonOp::Ne,
                ActionValue::Label(stat.condition.clone()),
            )),
            Dimension::HtfTrend => Some((
                FilterName::HtfTrend,
                ComparisonOp::Ne,
                ActionValue::Label(stat.condition.clone()),
            )),
            Dimension::LiquidityEvent => Some((
                FilterName::LiquidityEventType,
                ComparisonOp::Ne,
                ActionValue::Label(stat.condition.clone()),
            )),
            Dimension::HtfStructure => None,
            Dimension::VwapDistance => bound_action(FilterName::VwapDistance, b, true, true),
            Dimension::NewsProximity if stat.condition != NO_NEWS => {
                bound_action(FilterName::NewsEventProximityMinutes, b, true, false)
            }
            Dimension::NewsProximity => None,
            Dimension::Spread => bound_action(FilterName::SpreadValue, b, false, true),
            Dimension::ConsecutiveCandles => b.lower.filter(|_| b.is_ceiling()).map(|lower| {
                (
                    FilterName::ConsecutiveBullishCandles,
                    ComparisonOp::Le,
                    ActionValue::Number(lower - 1.0),
                )
            }),
            Dimension::ProbabilityScore => {
                bound_action(FilterName::ProbabilityScore, b, true, false)
            }
            Dimension::RsiDivergence => flag_action(FilterName::RsiDivergence, &stat.condition),
            Dimension::LargeWick => flag_action(FilterName::HasLargeWick, &stat.condition),
            Dimension::VolumeSpike => flag_action(FilterName::VolumeSpike, &stat.condition),
        };

        if let Some((filter, operator, value)) = proposal {
            items.push(ActionItem {
                filter,
                operator,
                value,
                rationale,
            });
        }
    }

    items
}

/// A losing lowest bucket raises the floor to its upper edge; a losing
/// highest bucket lowers the ceiling to its lower edge. Middle buckets
/// cannot be expressed as a single threshold.
fn bound_action(
    filter: FilterName,
    b: &Bucket,
    allow_floor: bool,
    allow_ceiling: bool,
) -> Option<(FilterName, ComparisonOp, ActionValue)> {
    if allow_floor && b.is_floor() {
        return b
            .upper
            .map(|upper| (filter, ComparisonOp::Ge, ActionValue::Number(upper)));
    }
    if allow_ceiling && b.is_ceiling() {
        return b
            .lower
            .map(|lower| (filter, ComparisonOp::Lt, ActionValue::Number(lower)));
    }
    None
}

fn flag_action(
    filter: FilterName,
    condition: &str,
) -> Option<(FilterName, ComparisonOp, ActionValue)> {
    (condition == "false").then(|| (filter, ComparisonOp::Eq, ActionValue::Flag(true)))
}

/// Score points above the probability threshold that still count as marginal
const SCORE_MARGIN: f64 = 10.0;
/// Minutes beyond the news buffer that still count as marginal
const NEWS_MARGIN_MINUTES: i64 = 30;
/// VWAP distance inside a configured floor or ceiling that counts as marginal
const VWAP_MARGIN: f64 = 2.0;
/// Fraction of the spread ceiling, measured down from it, that counts as marginal
const SPREAD_MARGIN: f64 = 0.25;
const CANDLE_MARGIN: u32 = 1;

/// Whether a trade passed `predicate` only narrowly. `None` when the predicate
/// has no margin under `config` (inactive, or a pure membership check).
fn is_marginal(predicate: GatePredicate, config: &EvaluatorConfig, trade: &ClosedTrade) -> Option<bool> {
    let rule = &config.structure;
    let snapshot = &trade.snapshot;
    match predicate {
        GatePredicate::SessionWindow
        | GatePredicate::LiquidityEvent
        | GatePredicate::RequiredFlags => None,
        GatePredicate::NewsProximity => Some(matches!(
            snapshot.news_event_proximity_minutes,
            Some(minutes) if minutes < config.min_news_proximity_minutes + NEWS_MARGIN_MINUTES
        )),
        GatePredicate::TrendAlignment => {
            let aligned = match config.direction {
                Direction::Short => HtfTrend::Bearish,
                Direction::Long => HtfTrend::Bullish,
            };
            (!rule.rejected_trends.is_empty()).then(|| snapshot.htf_trend != aligned)
        }
        GatePredicate::Confirmation => rule
            .require_confirmation
            .then(|| !(snapshot.rsi_divergence && snapshot.has_large_wick)),
        GatePredicate::VwapBounds => {
            if rule.min_vwap_distance.is_none() && rule.max_vwap_distance.is_none() {
                return None;
            }
            let near_floor = rule
                .min_vwap_distance
                .is_some_and(|min| snapshot.vwap_distance < min + VWAP_MARGIN);
            let near_ceiling = rule
                .max_vwap_distance
                .is_some_and(|max| snapshot.vwap_distance > max - VWAP_MARGIN);
            Some(near_floor || near_ceiling)
        }
        GatePredicate::SpreadCeiling => rule
            .max_spread
            .map(|max| snapshot.spread_value > max * (1.0 - SPREAD_MARGIN)),
        GatePredicate::CandleCeiling => rule
            .max_consecutive_bullish_candles
            .map(|max| snapshot.consecutive_bullish_candles + CANDLE_MARGIN > max),
        GatePredicate::ProbabilityThreshold => Some(
            trade.plan.probability_score < config.min_probability_score + SCORE_MARGIN,
        ),
    }
}

/// Margin sensitivity of every gating predicate of `config` over the sample.
///
/// Trades are split into those that passed the predicate narrowly and those
/// clear of it. Sensitivity is `win_rate(clear) - win_rate(marginal)`: a
/// positive value means the trades the gate barely admitted did worse, so
/// the gate is separating outcomes and tightening it would help. Both groups
/// need `min_support` trades and at least one decided trade. Only positive
/// values are returned, strongest first.
pub fn filter_sensitivity(
    sample: &[ClosedTrade],
    config: &EvaluatorConfig,
    min_support: u32,
) -> Vec<FilterSensitivity> {
    let mut results: Vec<FilterSensitivity> = GatePredicate::ALL
        .iter()
        .filter_map(|predicate| {
            let mut clear = Tally::default();
            let mut marginal = Tally::default();
            for trade in sample {
                if is_marginal(*predicate, config, trade)? {
                    marginal.add(trade);
                } else {
                    clear.add(trade);
                }
            }
            let supported = |t: &Tally| t.trades >= min_support && t.decided() > 0;
            if !supported(&clear) || !supported(&marginal) {
                return None;
            }
            Some(FilterSensitivity {
                predicate: *predicate,
                win_rate_clear: clear.win_rate(),
                win_rate_marginal: marginal.win_rate(),
                avg_r_clear: clear.avg_r(),
                avg_r_marginal: marginal.avg_r(),
                sensitivity: clear.win_rate() - marginal.win_rate(),
                clear_trades: clear.trades,
                marginal_trades: marginal.trades,
            })
        })
        .filter(|f| f.sensitivity > 0.0)
        .collect();

    // stable sort keeps predicate order among equals
    results.sort_by(|a, b| b.sensitivity.total_cmp(&a.sensitivity));
    results
}

fn regime_notes(sample: &[ClosedTrade], overall: &Tally) -> String {
    let breakeven = overall.trades - overall.decided();
    let mut lines = vec![
        format!(
            "Sample: {} trades ({} wins, {} losses, {} break-even)",
            overall.trades, overall.wins, overall.losses, breakeven
        ),
        format!(
            "Overall win rate {:.1}%, average {:+.2}R",
            overall.win_rate() * 100.0,
            overall.avg_r()
        ),
    ];

    let mut sessions: BTreeMap<&str, Tally> = BTreeMap::new();
    let mut liquidity: BTreeMap<&str, Tally> = BTreeMap::new();
    for trade in sample {
        sessions
            .entry(trade.snapshot.session.as_str())
            .or_default()
            .add(trade);
        liquidity
            .entry(trade.snapshot.liquidity_event_type.as_str())
            .or_default()
            .add(trade);
    }

    let sessions: Vec<String> = sessions
        .iter()
        .map(|(name, t)| format!("{} {:.1}% ({})", name, t.win_rate() * 100.0, t.trades))
        .collect();
    lines.push(format!("Session win rates: {}", sessions.join(", ")));

    let expectancy: Vec<String> = liquidity
        .iter()
        .map(|(name, t)| format!("{} {:+.2}R ({})", name, t.avg_r(), t.trades))
        .collect();
    lines.push(format!("Expectancy by liquidity event: {}", expectancy.join(", ")));

    let negative: Vec<&str> = liquidity
        .iter()
        .filter(|(_, t)| t.avg_r() < 0.0)
        .map(|(name, _)| *name)
        .collect();
    if !negative.is_empty() {
        lines.push(format!("Negative expectancy: {}", negative.join(", ")));
    }

    lines.join("\n")
}

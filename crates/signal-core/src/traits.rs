use crate::{Direction, MarketSnapshot, TradeLevels};

/// Probability model: maps a snapshot to a 0-100 score.
///
/// Implementations must be deterministic so evaluations can be replayed in backtests.
pub trait ScoreModel: Send + Sync {
    fn score(&self, snapshot: &MarketSnapshot) -> f64;

    fn name(&self) -> &str;
}

/// Price-level model: derives entry zone, stop and targets from a snapshot.
pub trait LevelModel: Send + Sync {
    fn levels(&self, snapshot: &MarketSnapshot, direction: Direction) -> TradeLevels;

    fn name(&self) -> &str;
}

use serde::{Deserialize, Serialize};
use signal_core::TradeLevels;

/// Dollar value of a one-point move for one lot
const POINT_VALUE_PER_LOT: f64 = 10.0;

/// Suggested size for a plan at a fixed fractional risk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    pub account_balance: f64,
    pub risk_percent: f64,
    pub risk_amount: f64,
    pub stop_distance: f64,
    pub lot_size: f64,
    pub suggested_leverage: u32,
}

impl PositionSizing {
    pub fn compute(account_balance: f64, risk_percent: f64, levels: &TradeLevels) -> Self {
        let risk_amount = account_balance * (risk_percent / 100.0);
        let stop_distance = (levels.entry_reference() - levels.stop_loss).abs();

        let lot_size = if stop_distance > 0.0 && stop_distance.is_finite() {
            risk_amount / (stop_distance * POINT_VALUE_PER_LOT)
        } else {
            0.0
        };
        let suggested_leverage = ((lot_size * 10.0) as u32).clamp(10, 100);

        Self {
            account_balance,
            risk_percent,
            risk_amount,
            stop_distance,
            lot_size,
            suggested_leverage,
        }
    }
}

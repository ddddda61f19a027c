use chrono::{DateTime, TimeZone, Utc};
use setup_evaluator::EvaluatorConfig;
use signal_core::{
    Direction, HtfTrend, LiquidityEvent, MarketSnapshot, PlanStatus, Session, TradeLevels,
    TradePlan,
};

use crate::db::JournalDb;

pub async fn setup_test_db() -> JournalDb {
    let db = JournalDb::in_memory().await.expect("in-memory SQLite");
    db.seed_config(&EvaluatorConfig::default())
        .await
        .expect("seed config");
    db
}

pub fn sample_snapshot() -> MarketSnapshot {
    sample_snapshot_at(Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap())
}

pub fn sample_snapshot_at(timestamp: DateTime<Utc>) -> MarketSnapshot {
    MarketSnapshot {
        id: None,
        timestamp,
        session: Session::London,
        htf_trend: HtfTrend::Bearish,
        htf_structure: "LH".to_string(),
        key_resistance_level: 2040.0,
        liquidity_event_type: LiquidityEvent::AsianHighSweep,
        has_large_wick: true,
        consecutive_bullish_candles: 3,
        atr_value: 4.0,
        rsi_divergence: true,
        vwap_distance: 6.5,
        volume_spike: false,
        spread_value: 0.25,
        news_event_proximity_minutes: None,
    }
}

pub fn sample_plan() -> TradePlan {
    sample_plan_at(Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap())
}

pub fn sample_plan_at(created_at: DateTime<Utc>) -> TradePlan {
    TradePlan {
        id: None,
        snapshot_id: None,
        created_at,
        direction: Direction::Short,
        levels: TradeLevels {
            entry_zone_start: 2037.0,
            entry_zone_end: 2039.0,
            stop_loss: 2041.0,
            tp1: 2032.0,
            tp2: 2029.0,
        },
        estimated_rr: 2.0,
        probability_score: 75.0,
        status: PlanStatus::Pending,
        config_version: 1,
    }
}

pub async fn executed_plan(db: &JournalDb) -> i64 {
    executed_plan_at(db, Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap()).await
}

pub async fn executed_plan_at(db: &JournalDb, at: DateTime<Utc>) -> i64 {
    let plan_id = db
        .record_cycle(&sample_snapshot_at(at), Some(&sample_plan_at(at)))
        .await
        .unwrap()
        .plan_id
        .unwrap();
    db.transition_plan(plan_id, PlanStatus::Executed)
        .await
        .unwrap();
    plan_id
}

#[cfg(test)]
mod review_tests {
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use setup_evaluator::{EvaluatorConfig, SetupEvaluator};
    use signal_core::{
        ActionValue, ClosedTrade, ComparisonOp, Dimension, Direction, FilterName, GatePredicate,
        HtfTrend, LiquidityEvent, MarketSnapshot, OutcomeCategory, PlanStatus, Session,
        TradeLevels, TradeOutcome, TradePlan,
    };

    use crate::{
        filter_sensitivity, render_report, LearningAggregator, ReviewSettings, LOW_CONFIDENCE_NOTE,
    };

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
    }

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()
    }

    fn trade(id: i64, outcome: OutcomeCategory) -> ClosedTrade {
        let timestamp = start() + Duration::hours(id);
        let r = match outcome {
            OutcomeCategory::Win => 2.0,
            OutcomeCategory::Loss => -1.0,
            OutcomeCategory::BreakEven => 0.0,
        };
        ClosedTrade {
            snapshot: MarketSnapshot {
                id: Some(id),
                timestamp,
                session: Session::London,
                htf_trend: HtfTrend::Bearish,
                htf_structure: "LH".to_string(),
                key_resistance_level: 2040.0,
                liquidity_event_type: LiquidityEvent::AsianHighSweep,
                has_large_wick: true,
                consecutive_bullish_candles: 2,
                atr_value: 4.0,
                rsi_divergence: true,
                vwap_distance: 6.0,
                volume_spike: false,
                spread_value: 0.2,
                news_event_proximity_minutes: None,
            },
            plan: TradePlan {
                id: Some(id),
                snapshot_id: Some(id),
                created_at: timestamp,
                direction: Direction::Short,
                levels: TradeLevels {
                    entry_zone_start: 2037.0,
                    entry_zone_end: 2039.0,
                    stop_loss: 2041.0,
                    tp1: 2032.0,
                    tp2: 2029.0,
                },
                estimated_rr: 2.0,
                probability_score: 80.0,
                status: PlanStatus::Executed,
                config_version: 1,
            },
            outcome: TradeOutcome {
                id: Some(id),
                plan_id: id,
                entry_price: 2038.0,
                exit_price: 2038.0 - 3.0 * r,
                outcome,
                realized_r_multiple: r,
                pnl_percent: r * 0.5,
                comments: None,
                recorded_at: timestamp + Duration::hours(4),
            },
        }
    }

    fn run(sample: &[ClosedTrade]) -> signal_core::LearningReview {
        LearningAggregator::default().review(
            sample,
            &EvaluatorConfig::default(),
            start(),
            end(),
            end(),
        )
    }

    /// 6 London trades (5W 1L) and 6 New York trades (1W 5L)
    fn session_split() -> Vec<ClosedTrade> {
        let mut sample = Vec::new();
        for i in 0..12 {
            let outcome = match (i < 6, i % 6 == 0) {
                (true, false) | (false, true) => OutcomeCategory::Win,
                _ => OutcomeCategory::Loss,
            };
            let mut t = trade(i, outcome);
            if i >= 6 {
                t.snapshot.session = Session::NewYork;
            }
            sample.push(t);
        }
        sample
    }

    #[test]
    fn test_small_sample_is_low_confidence() {
        let sample: Vec<_> = (0..8).map(|i| trade(i, OutcomeCategory::Loss)).collect();
        let review = run(&sample);

        assert!(review.low_confidence);
        assert_eq!(review.sample_size, 8);
        assert!(review.action_items.is_empty());
        assert!(review.high_performing_conditions.is_empty());
        assert!(review.loss_prone_conditions.is_empty());
        assert!(review.regime_notes.starts_with(LOW_CONFIDENCE_NOTE));
    }

    #[test]
    fn test_empty_window_is_low_confidence() {
        let review = run(&[]);
        assert!(review.low_confidence);
        assert_eq!(review.sample_size, 0);
    }

    #[test]
    fn test_session_edges_and_action_item() {
        let review = run(&session_split());
        assert!(!review.low_confidence);

        let high = &review.high_performing_conditions;
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].dimension, Dimension::Session);
        assert_eq!(high[0].condition, "LONDON");
        assert_relative_eq!(high[0].win_rate, 5.0 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(high[0].edge, 5.0 / 6.0 - 0.5, epsilon = 1e-9);

        let loss = &review.loss_prone_conditions;
        assert_eq!(loss.len(), 1);
        assert_eq!(loss[0].condition, "NEW_YORK");
        assert_eq!(loss[0].wins, 1);
        assert_eq!(loss[0].losses, 5);

        assert_eq!(review.action_items.len(), 1);
        let item = &review.action_items[0];
        assert_eq!(item.filter, FilterName::Session);
        assert_eq!(item.operator, ComparisonOp::Ne);
        assert_eq!(item.value, ActionValue::Label("NEW_YORK".to_string()));
        assert_eq!(item.to_string(), "session != NEW_YORK");
    }

    #[test]
    fn test_action_items_apply_to_config() {
        let review = run(&session_split());
        let config = EvaluatorConfig::default();
        let next = config.apply_action_items(&review.action_items).unwrap();

        assert_eq!(next.version, 2);
        assert!(!next.active_sessions.contains(&Session::NewYork));
        assert!(next.active_sessions.contains(&Session::London));
    }

    #[test]
    fn test_break_evens_only_count_toward_support() {
        let mut sample: Vec<_> = (0..6).map(|i| trade(i, OutcomeCategory::Win)).collect();
        sample.extend((6..8).map(|i| trade(i, OutcomeCategory::Loss)));
        sample.extend((8..12).map(|i| trade(i, OutcomeCategory::BreakEven)));

        let review = run(&sample);
        assert_eq!(review.sample_size, 12);
        assert!(review.regime_notes.contains("6 wins, 2 losses, 4 break-even"));
        assert!(review.regime_notes.contains("Overall win rate 75.0%"));
    }

    #[test]
    fn test_losing_low_vwap_raises_floor() {
        let mut sample = Vec::new();
        for i in 0..12 {
            let low = i < 6;
            let outcome = match (low, i % 6 == 0) {
                (true, true) | (false, false) => OutcomeCategory::Win,
                _ => OutcomeCategory::Loss,
            };
            let mut t = trade(i, outcome);
            if low {
                t.snapshot.vwap_distance = -2.0;
            }
            sample.push(t);
        }

        let review = run(&sample);
        let item = review
            .action_items
            .iter()
            .find(|a| a.filter == FilterName::VwapDistance)
            .unwrap();
        assert_eq!(item.operator, ComparisonOp::Ge);
        assert_eq!(item.value, ActionValue::Number(0.0));

        let next = EvaluatorConfig::default()
            .apply_action_items(&review.action_items)
            .unwrap();
        assert_eq!(next.structure.min_vwap_distance, Some(0.0));
    }

    #[test]
    fn test_missing_flag_proposes_requirement() {
        let mut sample = Vec::new();
        for i in 0..12 {
            let spiked = i < 6;
            let outcome = match (spiked, i % 6 == 0) {
                (true, false) | (false, true) => OutcomeCategory::Win,
                _ => OutcomeCategory::Loss,
            };
            let mut t = trade(i, outcome);
            t.snapshot.volume_spike = spiked;
            sample.push(t);
        }

        let review = run(&sample);
        let item = review
            .action_items
            .iter()
            .find(|a| a.filter == FilterName::VolumeSpike)
            .unwrap();
        assert_eq!(item.operator, ComparisonOp::Eq);
        assert_eq!(item.value, ActionValue::Flag(true));
    }

    /// Plans produced by the default evaluator: six stretched setups scoring
    /// 90 (5W 1L) and six unstretched ones scoring 75 (1W 5L)
    fn evaluated_sample() -> Vec<ClosedTrade> {
        let evaluator = SetupEvaluator::new(EvaluatorConfig::default());
        (0..12)
            .map(|i| {
                let stretched = i < 6;
                let win = if stretched { i != 0 } else { i == 6 };
                let mut t = trade(i, if win { OutcomeCategory::Win } else { OutcomeCategory::Loss });
                if !stretched {
                    t.snapshot.vwap_distance = 3.0;
                }
                let plan = evaluator.evaluate(&t.snapshot).plan().cloned().unwrap();
                t.plan.probability_score = plan.probability_score;
                t.plan.levels = plan.levels;
                t.plan.estimated_rr = plan.estimated_rr;
                t
            })
            .collect()
    }

    #[test]
    fn test_filter_sensitivity_separates_marginal_scores() {
        let sample = evaluated_sample();
        assert_relative_eq!(sample[0].plan.probability_score, 90.0);
        assert_relative_eq!(sample[6].plan.probability_score, 75.0);

        let review = run(&sample);
        // every other gate is inactive or admits the whole sample with room to spare
        assert_eq!(review.strongest_filters.len(), 1);
        let threshold = &review.strongest_filters[0];
        assert_eq!(threshold.predicate, GatePredicate::ProbabilityThreshold);
        assert_eq!(threshold.clear_trades, 6);
        assert_eq!(threshold.marginal_trades, 6);
        assert_relative_eq!(threshold.win_rate_clear, 5.0 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(threshold.win_rate_marginal, 1.0 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(threshold.sensitivity, 4.0 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(threshold.avg_r_clear, 1.5, epsilon = 1e-9);
        assert_relative_eq!(threshold.avg_r_marginal, -0.5, epsilon = 1e-9);

        let report = render_report(&review);
        assert!(report.contains("probability_threshold"));
        assert!(report.contains("+66.7 pts"));
    }

    #[test]
    fn test_filter_sensitivity_uses_configured_ceilings() {
        let mut sample = evaluated_sample();
        // wide spreads on the losing half, tight on the winning half
        for t in sample.iter_mut().skip(6) {
            t.snapshot.spread_value = 0.35;
        }
        let mut config = EvaluatorConfig::default();
        config.structure.max_spread = Some(0.4);

        let filters = filter_sensitivity(&sample, &config, 3);
        let predicates: Vec<_> = filters.iter().map(|f| f.predicate).collect();
        assert_eq!(
            predicates,
            vec![GatePredicate::SpreadCeiling, GatePredicate::ProbabilityThreshold]
        );
        assert_relative_eq!(filters[0].sensitivity, filters[1].sensitivity, epsilon = 1e-9);

        // without a ceiling the spread gate has no margin to judge
        config.structure.max_spread = None;
        let filters = filter_sensitivity(&sample, &config, 3);
        assert!(filters.iter().all(|f| f.predicate != GatePredicate::SpreadCeiling));
    }

    #[test]
    fn test_review_is_reproducible() {
        let sample = session_split();
        let a = run(&sample);
        let b = run(&sample);

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_min_sample_is_configurable() {
        let sample: Vec<_> = (0..8).map(|i| trade(i, OutcomeCategory::Win)).collect();
        let aggregator = LearningAggregator::new(ReviewSettings {
            min_sample: 5,
            ..ReviewSettings::default()
        });
        let review = aggregator.review(&sample, &EvaluatorConfig::default(), start(), end(), end());
        assert!(!review.low_confidence);
    }

    #[test]
    fn test_report_rendering() {
        let mut review = run(&session_split());
        review.id = Some(3);
        let text = render_report(&review);

        assert!(text.starts_with("SELF-LEARNING REVIEW #3 - XAUUSD"));
        assert!(text.contains("LOSS-PRONE CONDITIONS"));
        assert!(text.contains("session != NEW_YORK"));
        assert!(text.contains("Session win rates: LONDON 83.3% (6), NEW_YORK 16.7% (6)"));

        let small = run(&[]);
        let text = render_report(&small);
        assert!(text.contains(LOW_CONFIDENCE_NOTE));
        assert!(!text.contains("RECOMMENDATIONS"));
    }
}

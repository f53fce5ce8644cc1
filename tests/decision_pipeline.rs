use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone, Utc};
use sessionbot::backtest::{MarketScenario, SyntheticDataGenerator};
use sessionbot::calendar::{CalendarConfig, TradingCalendar};
use sessionbot::combiner::{CombineMethod, CombinerConfig};
use sessionbot::engine::EngineConfig;
use sessionbot::planning::{StopConfig, StopTargetCalculator};
use sessionbot::risk::PositionSizer;
use sessionbot::strategy::{build_strategies, SignalSet};
use sessionbot::*;

const BAR_MS: i64 = 15 * 60_000;

fn combined(signal: i8) -> CombinedSignal {
    CombinedSignal {
        signal,
        confidence: signal.abs() as f64,
        weights: BTreeMap::new(),
        method: CombineMethod::SimpleAverage,
        tie_resolved: false,
    }
}

/// Two days of 15-minute bars starting 2024-01-02 00:00 UTC
fn two_days() -> BarSeries {
    let bars = SyntheticDataGenerator::new(11).generate(MarketScenario::Sideways, 192, 15);
    BarSeries::new(bars, BAR_MS).unwrap()
}

fn index_at(series: &BarSeries, h: u32, m: u32) -> usize {
    let ts = Utc.with_ymd_and_hms(2024, 1, 2, h, m, 0).unwrap().timestamp_millis();
    series.bars().iter().position(|b| b.timestamp == ts).unwrap()
}

fn decide(engine: &mut DecisionEngine, series: &BarSeries, t: usize, signal: i8) -> DailyDecision {
    let signal = combined(signal);
    engine.decide(&DecisionContext {
        symbol: "SYNTH",
        window: series.window(t).unwrap(),
        signal: &signal,
        capital: 10_000.0,
        risk_pct: None,
    })
}

#[test]
fn test_scenario_a_no_retarget() {
    let plan = StopTargetCalculator::default()
        .calculate_with_atr(50_000.0, Side::Long, 1000.0, &[])
        .unwrap();
    assert!((plan.stop_loss - 48_000.0).abs() < 1e-9);
    assert!((plan.take_profit - 53_000.0).abs() < 1e-9);
    assert!((plan.risk_reward_ratio - 1.5).abs() < 1e-9);
}

#[test]
fn test_scenario_b_retarget_to_min_rr() {
    let calc = StopTargetCalculator::new(StopConfig {
        k_tp: 1.0,
        ..StopConfig::default()
    })
    .unwrap();
    let plan = calc.calculate_with_atr(50_000.0, Side::Long, 1000.0, &[]).unwrap();
    assert!((plan.stop_loss - 48_000.0).abs() < 1e-9);
    assert!((plan.take_profit - 53_000.0).abs() < 1e-9);
}

#[test]
fn test_scenario_c_fixed_risk_sizing() {
    let size = PositionSizer::default().size(100_000.0, 0.02, 50_000.0, 49_000.0).unwrap();
    assert!((size.risk_amount - 2000.0).abs() < 1e-9);
    assert!((size.quantity - 2.0).abs() < 1e-12);
}

#[test]
fn test_scenario_d_forced_close_boundary_in_local_time() {
    let calendar = TradingCalendar::from_config(&CalendarConfig {
        timezone: "Europe/Paris".to_string(),
        ..CalendarConfig::default()
    })
    .unwrap();

    // 16:45 in Paris is 15:45 UTC in winter
    let at_close = Utc.with_ymd_and_hms(2024, 1, 10, 15, 45, 0).unwrap();
    let minute_before = Utc.with_ymd_and_hms(2024, 1, 10, 15, 44, 0).unwrap();
    assert!(calendar.should_force_close(at_close));
    assert!(!calendar.should_force_close(minute_before));
}

#[test]
fn test_scenario_e_window_b_skipped_after_a() {
    let series = two_days();
    let mut engine = DecisionEngine::new(&EngineConfig::default()).unwrap();

    let morning = decide(&mut engine, &series, index_at(&series, 10, 0), 1);
    assert_eq!(morning.state, DecisionState::PlannedAndSized);
    assert_eq!(morning.window, Some(Window::A));

    let afternoon = decide(&mut engine, &series, index_at(&series, 14, 30), 1);
    assert_eq!(afternoon.state, DecisionState::WindowBSkippedAfterA);
    assert!(!afternoon.should_execute);
    assert!(afternoon.skip_reason.unwrap().contains("window A already executed"));
    assert_eq!(afternoon.trading_day, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
}

#[test]
fn test_next_day_window_b_is_not_blocked() {
    let series = two_days();
    let mut engine = DecisionEngine::new(&EngineConfig::default()).unwrap();
    assert!(decide(&mut engine, &series, index_at(&series, 10, 0), -1).should_execute);

    // 14:30 on the following day
    let next_day = index_at(&series, 14, 30) + 96;
    let decision = decide(&mut engine, &series, next_day, -1);
    assert_eq!(decision.state, DecisionState::PlannedAndSized);
    assert_eq!(decision.window, Some(Window::B));
}

#[test]
fn test_executable_decisions_hold_price_ordering_and_sizing() {
    let series = two_days();
    let mut engine = DecisionEngine::new(&EngineConfig::default()).unwrap();

    for (h, m, signal) in [(9, 30, 1), (11, 0, -1), (15, 0, 1)] {
        engine.reset();
        let decision = decide(&mut engine, &series, index_at(&series, h, m), signal);
        let plan = decision.plan.expect("planned");

        match plan.side {
            Side::Long => {
                assert!(plan.stops.stop_loss < plan.entry.entry_price);
                assert!(plan.entry.entry_price < plan.stops.take_profit);
            }
            Side::Short => {
                assert!(plan.stops.take_profit < plan.entry.entry_price);
                assert!(plan.entry.entry_price < plan.stops.stop_loss);
            }
        }
        assert!(plan.entry.entry_low <= plan.entry.entry_price);
        assert!(plan.entry.entry_price <= plan.entry.entry_high);

        let risk = (plan.entry.entry_price - plan.stops.stop_loss).abs();
        assert!((plan.size.risk_amount - 100.0).abs() < 1e-9);
        assert!((plan.size.quantity * risk - plan.size.risk_amount).abs() < 1e-6);
    }
}

#[test]
fn test_gates_in_order() {
    let series = two_days();
    let mut engine = DecisionEngine::new(&EngineConfig::default()).unwrap();

    // Flat wins even outside hours
    let decision = decide(&mut engine, &series, index_at(&series, 3, 0), 0);
    assert_eq!(decision.state, DecisionState::NoSignal);

    let decision = decide(&mut engine, &series, index_at(&series, 3, 0), 1);
    assert_eq!(decision.state, DecisionState::OutsideHours);

    let decision = decide(&mut engine, &series, index_at(&series, 16, 30), 1);
    assert_eq!(decision.state, DecisionState::TooCloseToClose);
}

#[test]
fn test_warmup_is_a_skip_not_an_error() {
    let bars = SyntheticDataGenerator::new(3)
        .with_start(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap().timestamp_millis())
        .generate(MarketScenario::Uptrend, 5, 15);
    let series = BarSeries::new(bars, BAR_MS).unwrap();
    let mut engine = DecisionEngine::new(&EngineConfig::default()).unwrap();

    let decision = decide(&mut engine, &series, 4, 1);
    assert_eq!(decision.state, DecisionState::PlanFailed);
    assert!(!decision.should_execute);
    assert!(decision.skip_reason.is_some());
}

#[test]
fn test_at_most_one_window_executes_per_day() {
    let bars = SyntheticDataGenerator::new(5).generate(MarketScenario::Volatile, 96 * 5, 15);
    let series = BarSeries::new(bars, BAR_MS).unwrap();
    let strategies = build_strategies(&AppConfig::default().strategies).unwrap();
    let signals = SignalSet::from_strategies(&strategies, &series).unwrap();

    let mut combiner = SignalCombiner::new(CombinerConfig::default()).unwrap();
    let mut engine = DecisionEngine::new(&EngineConfig::default()).unwrap();
    let mut executed: BTreeMap<NaiveDate, Vec<Window>> = BTreeMap::new();

    for t in 0..series.len() {
        let window = series.window(t).unwrap();
        let signal = combiner.combine(&signals.view(t).unwrap(), &window).unwrap();
        assert!((-1..=1).contains(&signal.signal));
        assert!((0.0..=1.0).contains(&signal.confidence));

        let decision = engine.decide(&DecisionContext {
            symbol: "SYNTH",
            window,
            signal: &signal,
            capital: 10_000.0,
            risk_pct: None,
        });
        if let (true, Some(w)) = (decision.should_execute, decision.window) {
            executed.entry(decision.trading_day).or_default().push(w);
            assert!(engine.tracker().is_window_executed(decision.trading_day, w));
        }
    }

    assert!(!executed.is_empty());
    for (day, windows) in &executed {
        assert_eq!(windows.len(), 1, "{:?} executed on {}", windows, day);
    }
}

#[test]
fn test_window_a_does_not_execute_twice() {
    let series = two_days();
    let mut engine = DecisionEngine::new(&EngineConfig::default()).unwrap();

    let first = decide(&mut engine, &series, index_at(&series, 9, 30), 1);
    assert!(first.should_execute);

    for (h, m) in [(9, 45), (10, 30), (12, 0)] {
        let again = decide(&mut engine, &series, index_at(&series, h, m), -1);
        assert_eq!(again.state, DecisionState::WindowAlreadyExecuted);
        assert!(!again.should_execute);
    }
}

#[test]
fn test_unknown_strategy_is_rejected() {
    let configs = vec![sessionbot::strategy::StrategyConfig::new("tea_leaves")];
    let err = build_strategies(&configs).err().unwrap();
    assert!(matches!(err, CoreError::UnknownStrategy(_)));
}

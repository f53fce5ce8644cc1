//! Daily decision engine.
//!
//! Gates a combined signal through the session calendar, in a fixed order:
//!
//! 1. flat signal -> `NoSignal`
//! 2. outside both windows -> `OutsideHours`
//! 3. too close to (or past) the forced close -> `TooCloseToClose`
//! 4. window B after window A executed, with skip-B enabled -> `WindowBSkippedAfterA`
//! 5. this window already executed today -> `WindowAlreadyExecuted`
//! 6. otherwise entry, stop/target and size are planned -> `PlannedAndSized`
//!
//! Calculator failures in step 6 become a `PlanFailed` decision. `decide`
//! always returns a decision.

pub mod tracker;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{instant_from_millis, CalendarConfig, TradingCalendar};
use crate::combiner::CombinedSignal;
use crate::error::CoreError;
use crate::indicators::latest_atr;
use crate::models::{BarWindow, Side, Window};
use crate::planning::{EntryBandCalculator, EntryConfig, EntryPlan, StopConfig, StopTargetCalculator, StopTargetPlan};
use crate::risk::{PositionSize, PositionSizer, SizingConfig};
use crate::Result;

pub use tracker::ExecutionTracker;

/// Everything the engine needs to build its calculators
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub calendar: CalendarConfig,
    pub entry: EntryConfig,
    pub stops: StopConfig,
    pub sizing: SizingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    NoSignal,
    OutsideHours,
    TooCloseToClose,
    WindowBSkippedAfterA,
    WindowAlreadyExecuted,
    PlanFailed,
    PlannedAndSized,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TradePlan {
    pub side: Side,
    pub entry: EntryPlan,
    pub stops: StopTargetPlan,
    pub size: PositionSize,
}

/// One evaluation of one symbol at one instant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyDecision {
    pub symbol: String,
    /// Epoch milliseconds (UTC) of the evaluated bar
    pub timestamp: i64,
    pub trading_day: NaiveDate,
    pub window: Option<Window>,
    pub state: DecisionState,
    pub signal: i8,
    pub confidence: f64,
    pub side: Option<Side>,
    pub should_execute: bool,
    pub skip_reason: Option<String>,
    pub plan: Option<TradePlan>,
}

/// Inputs of a single evaluation
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub symbol: &'a str,
    pub window: BarWindow<'a>,
    pub signal: &'a CombinedSignal,
    pub capital: f64,
    /// Overrides the configured risk fraction (e.g. from the Kelly sizer)
    pub risk_pct: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    calendar: TradingCalendar,
    min_minutes_before_close: i64,
    skip_window_b_after_a: bool,
    entry: EntryBandCalculator,
    stops: StopTargetCalculator,
    sizer: PositionSizer,
    risk_pct: f64,
    tracker: ExecutionTracker,
}

impl DecisionEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        if config.calendar.min_minutes_before_close < 0 {
            return Err(CoreError::validation("min_minutes_before_close must not be negative"));
        }
        config.sizing.validate()?;

        Ok(Self {
            calendar: TradingCalendar::from_config(&config.calendar)?,
            min_minutes_before_close: config.calendar.min_minutes_before_close,
            skip_window_b_after_a: config.calendar.skip_window_b_after_a,
            entry: EntryBandCalculator::new(config.entry.clone())?,
            stops: StopTargetCalculator::new(config.stops.clone())?,
            sizer: PositionSizer::new(config.sizing.max_risk_pct)?,
            risk_pct: config.sizing.risk_pct,
            tracker: ExecutionTracker::new(),
        })
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn risk_pct(&self) -> f64 {
        self.risk_pct
    }

    /// Forget every executed day, for a fresh run
    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    /// Evaluate the context's current bar
    pub fn decide(&mut self, ctx: &DecisionContext<'_>) -> DailyDecision {
        let timestamp = ctx.window.current().timestamp;
        let t = match instant_from_millis(timestamp) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(symbol = ctx.symbol, timestamp, "Unusable bar timestamp: {}", e);
                let decision = self.skeleton(ctx, DateTime::<Utc>::default(), None);
                return self.finish(decision, DecisionState::PlanFailed, Some(e.to_string()));
            }
        };

        let window = self.calendar.current_window(t);
        let mut decision = self.skeleton(ctx, t, window);

        let Some(side) = Side::from_signal(ctx.signal.signal) else {
            return self.finish(decision, DecisionState::NoSignal, Some("combined signal is flat".to_string()));
        };
        decision.side = Some(side);

        let Some(window) = window else {
            let reason = format!("{} is outside both trading windows", self.calendar.local_time(t));
            return self.finish(decision, DecisionState::OutsideHours, Some(reason));
        };

        if self.calendar.should_force_close(t)
            || !self.calendar.is_valid_entry_time(t, self.min_minutes_before_close)
        {
            let reason = if self.calendar.should_force_close(t) {
                format!("past forced close at {}", self.calendar.forced_close_time())
            } else {
                format!(
                    "only {} minutes before forced close, need {}",
                    self.calendar.time_until_forced_close(t).num_minutes(),
                    self.min_minutes_before_close
                )
            };
            return self.finish(decision, DecisionState::TooCloseToClose, Some(reason));
        }

        if window == Window::B && self.skip_window_b_after_a && self.tracker.is_executed(decision.trading_day) {
            let reason = format!("window A already executed on {}", decision.trading_day);
            return self.finish(decision, DecisionState::WindowBSkippedAfterA, Some(reason));
        }

        if self.tracker.is_window_executed(decision.trading_day, window) {
            let reason = format!("window {} already executed on {}", window, decision.trading_day);
            return self.finish(decision, DecisionState::WindowAlreadyExecuted, Some(reason));
        }

        match self.build_plan(side, &ctx.window, t, ctx.capital, ctx.risk_pct) {
            Ok(plan) => {
                self.tracker.mark_executed(decision.trading_day, window);
                decision.plan = Some(plan);
                decision.should_execute = true;
                self.finish(decision, DecisionState::PlannedAndSized, None)
            }
            Err(e) => {
                tracing::warn!(
                    symbol = ctx.symbol,
                    timestamp,
                    "Plan failed, skipping: {}",
                    e
                );
                self.finish(decision, DecisionState::PlanFailed, Some(e.to_string()))
            }
        }
    }

    /// What-if plan for a non-zero signal, ignoring the calendar gates
    ///
    /// Does not touch the execution tracker.
    pub fn hypothetical_plan(
        &self,
        window: &BarWindow<'_>,
        signal: &CombinedSignal,
        capital: f64,
        risk_pct: Option<f64>,
    ) -> Result<TradePlan> {
        let side = Side::from_signal(signal.signal)
            .ok_or_else(|| CoreError::validation("combined signal is flat, nothing to plan"))?;
        let t = instant_from_millis(window.current().timestamp)?;
        self.build_plan(side, window, t, capital, risk_pct)
    }

    fn build_plan(
        &self,
        side: Side,
        window: &BarWindow<'_>,
        t: DateTime<Utc>,
        capital: f64,
        risk_pct: Option<f64>,
    ) -> Result<TradePlan> {
        let bars = window.bars();
        let atr = latest_atr(bars, self.stops.config().atr_period)?;
        let session_start = self.calendar.session_start(t).timestamp_millis();

        let entry = self.entry.plan(side, window, session_start, Some(atr));
        let stops = self.stops.calculate_with_atr(entry.entry_price, side, atr, bars)?;
        let size = self.sizer.size(
            capital,
            risk_pct.unwrap_or(self.risk_pct),
            entry.entry_price,
            stops.stop_loss,
        )?;

        Ok(TradePlan {
            side,
            entry,
            stops,
            size,
        })
    }

    fn skeleton(&self, ctx: &DecisionContext<'_>, t: DateTime<Utc>, window: Option<Window>) -> DailyDecision {
        DailyDecision {
            symbol: ctx.symbol.to_string(),
            timestamp: ctx.window.current().timestamp,
            trading_day: self.calendar.trading_day(t),
            window,
            state: DecisionState::NoSignal,
            signal: ctx.signal.signal,
            confidence: ctx.signal.confidence,
            side: None,
            should_execute: false,
            skip_reason: None,
            plan: None,
        }
    }

    fn finish(&self, mut decision: DailyDecision, state: DecisionState, skip_reason: Option<String>) -> DailyDecision {
        decision.state = state;
        decision.skip_reason = skip_reason;
        tracing::debug!(
            symbol = %decision.symbol,
            timestamp = decision.timestamp,
            state = ?decision.state,
            window = ?decision.window,
            execute = decision.should_execute,
            "Decision"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::CombineMethod;
    use crate::models::Bar;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap().timestamp_millis()
    }

    /// 15-minute bars ending at `end_h:end_m`, gently rising
    fn bars_until(end_h: u32, end_m: u32, n: usize) -> Vec<Bar> {
        let end = ts(end_h, end_m);
        (0..n)
            .map(|i| {
                let t = end - (n - 1 - i) as i64 * 15 * 60_000;
                let p = 100.0 + i as f64 * 0.1;
                Bar::new(t, p, p + 0.5, p - 0.5, p + 0.05, 1000.0)
            })
            .collect()
    }

    fn combined(signal: i8) -> CombinedSignal {
        CombinedSignal {
            signal,
            confidence: signal.abs() as f64,
            weights: Default::default(),
            method: CombineMethod::SimpleAverage,
            tie_resolved: false,
        }
    }

    fn decide_at(engine: &mut DecisionEngine, bars: &[Bar], signal: i8) -> DailyDecision {
        let signal = combined(signal);
        let ctx = DecisionContext {
            symbol: "BTCUSDT",
            window: BarWindow::from_slice(bars).unwrap(),
            signal: &signal,
            capital: 10_000.0,
            risk_pct: None,
        };
        engine.decide(&ctx)
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_flat_signal() {
        let bars = bars_until(10, 0, 20);
        let decision = decide_at(&mut engine(), &bars, 0);
        assert_eq!(decision.state, DecisionState::NoSignal);
        assert!(!decision.should_execute);
        assert!(decision.plan.is_none());
    }

    #[test]
    fn test_outside_hours() {
        let bars = bars_until(13, 0, 20);
        let decision = decide_at(&mut engine(), &bars, 1);
        assert_eq!(decision.state, DecisionState::OutsideHours);
        assert_eq!(decision.window, None);
    }

    #[test]
    fn test_too_close_to_close() {
        // 16:30 is in window B but 15 minutes before the forced close
        let bars = bars_until(16, 30, 20);
        let decision = decide_at(&mut engine(), &bars, 1);
        assert_eq!(decision.state, DecisionState::TooCloseToClose);

        // 16:50 is still window B but already past the forced close
        let bars = bars_until(16, 50, 20);
        let decision = decide_at(&mut engine(), &bars, -1);
        assert_eq!(decision.state, DecisionState::TooCloseToClose);
    }

    #[test]
    fn test_planned_long_in_window_a() {
        let mut engine = engine();
        let bars = bars_until(10, 0, 20);
        let decision = decide_at(&mut engine, &bars, 1);

        assert_eq!(decision.state, DecisionState::PlannedAndSized);
        assert_eq!(decision.window, Some(Window::A));
        assert!(decision.should_execute);
        assert!(decision.skip_reason.is_none());

        let plan = decision.plan.unwrap();
        assert_eq!(plan.side, Side::Long);
        assert!(plan.stops.stop_loss < plan.entry.entry_price);
        assert!(plan.entry.entry_price < plan.stops.take_profit);
        assert!((plan.size.risk_amount - 100.0).abs() < 1e-9);
        assert!(engine.tracker().is_executed(decision.trading_day));
    }

    #[test]
    fn test_window_b_skipped_after_a() {
        let mut engine = engine();
        let morning = bars_until(10, 0, 20);
        assert!(decide_at(&mut engine, &morning, 1).should_execute);

        let afternoon = bars_until(14, 30, 20);
        let decision = decide_at(&mut engine, &afternoon, -1);
        assert_eq!(decision.state, DecisionState::WindowBSkippedAfterA);
        assert!(!decision.should_execute);
        assert!(decision.skip_reason.unwrap().contains("window A"));

        engine.reset();
        let decision = decide_at(&mut engine, &afternoon, -1);
        assert_eq!(decision.state, DecisionState::PlannedAndSized);
    }

    #[test]
    fn test_window_executes_once_per_day() {
        let mut engine = engine();
        assert!(decide_at(&mut engine, &bars_until(10, 0, 20), 1).should_execute);

        let again = decide_at(&mut engine, &bars_until(10, 15, 20), 1);
        assert_eq!(again.state, DecisionState::WindowAlreadyExecuted);
        assert!(!again.should_execute);
        assert!(again.plan.is_none());
        assert!(again.skip_reason.unwrap().contains("window A already executed"));
    }

    #[test]
    fn test_window_b_allowed_when_skip_disabled() {
        let mut config = EngineConfig::default();
        config.calendar.skip_window_b_after_a = false;
        let mut engine = DecisionEngine::new(&config).unwrap();

        assert!(decide_at(&mut engine, &bars_until(10, 0, 20), 1).should_execute);
        assert!(decide_at(&mut engine, &bars_until(14, 30, 20), 1).should_execute);

        let again = decide_at(&mut engine, &bars_until(15, 0, 20), 1);
        assert_eq!(again.state, DecisionState::WindowAlreadyExecuted);
        assert!(engine.tracker().is_window_executed(again.trading_day, Window::B));
    }

    #[test]
    fn test_warmup_becomes_plan_failed() {
        let bars = bars_until(10, 0, 5);
        let mut engine = engine();
        let decision = decide_at(&mut engine, &bars, 1);

        assert_eq!(decision.state, DecisionState::PlanFailed);
        assert!(!decision.should_execute);
        assert!(decision.skip_reason.unwrap().contains("insufficient data"));
        assert!(!engine.tracker().is_executed(decision.trading_day));
    }

    #[test]
    fn test_invalid_risk_becomes_plan_failed() {
        let bars = bars_until(10, 0, 20);
        let signal = combined(1);
        let ctx = DecisionContext {
            symbol: "BTCUSDT",
            window: BarWindow::from_slice(&bars).unwrap(),
            signal: &signal,
            capital: 10_000.0,
            risk_pct: Some(0.5),
        };
        let decision = engine().decide(&ctx);
        assert_eq!(decision.state, DecisionState::PlanFailed);
        assert!(decision.skip_reason.unwrap().contains("risk_pct"));
    }

    #[test]
    fn test_hypothetical_plan_ignores_gates() {
        let mut engine = engine();
        let bars = bars_until(13, 0, 20);
        let signal = combined(-1);
        let window = BarWindow::from_slice(&bars).unwrap();

        let plan = engine.hypothetical_plan(&window, &signal, 10_000.0, None).unwrap();
        assert_eq!(plan.side, Side::Short);
        assert!(plan.stops.take_profit < plan.entry.entry_price);
        assert!(plan.entry.entry_price < plan.stops.stop_loss);
        assert_eq!(engine.tracker().executed_days().count(), 0);

        assert!(engine.hypothetical_plan(&window, &combined(0), 10_000.0, None).is_err());

        let decision = decide_at(&mut engine, &bars, -1);
        assert_eq!(decision.state, DecisionState::OutsideHours);
    }

    #[test]
    fn test_decision_is_repeatable() {
        let bars = bars_until(10, 0, 20);
        let first = decide_at(&mut engine(), &bars, 1);
        let second = decide_at(&mut engine(), &bars, 1);
        assert_eq!(first, second);
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::intrabar::IntrabarPolicy;
use super::metrics::BacktestMetrics;
use super::position::{BacktestTrade, ExitReason, OpenPosition};
use crate::calendar::{instant_from_millis, TradingCalendar};
use crate::combiner::{CombinedSignal, SignalCombiner};
use crate::engine::{DailyDecision, DecisionContext, DecisionEngine};
use crate::error::CoreError;
use crate::models::{Bar, BarSeries};
use crate::risk::{CircuitBreakerTrip, CircuitBreakers, KellyConfig, KellySizer, TradingState};
use crate::strategy::SignalSet;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacktestConfig {
    pub symbol: String,
    pub initial_capital: f64,
    /// Bars skipped before the first decision
    pub warmup_bars: usize,
    /// Round-trip transaction cost as a fraction of notional
    pub fee_pct: f64,
    pub intrabar_policy: IntrabarPolicy,
    /// Close when the combined signal flips against the position
    pub exit_on_reversal: bool,
    pub circuit_breakers: CircuitBreakers,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "SYNTH".to_string(),
            initial_capital: 10_000.0,
            warmup_bars: 30,
            fee_pct: 0.001,
            intrabar_policy: IntrabarPolicy::WorstCase,
            exit_on_reversal: true,
            circuit_breakers: CircuitBreakers::default(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(CoreError::validation(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(0.0..1.0).contains(&self.fee_pct) {
            return Err(CoreError::validation(format!(
                "fee_pct must be within [0, 1), got {}",
                self.fee_pct
            )));
        }
        self.circuit_breakers.validate()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EquityPoint {
    pub timestamp: i64,
    /// Realized equity plus the open position marked at the bar close
    pub equity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub trades: Vec<BacktestTrade>,
    /// Every decision evaluated on a non-flat combined signal
    pub decisions: Vec<DailyDecision>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: BacktestMetrics,
}

/// Bar-by-bar replay of combiner and decision engine with at most one open position
pub struct BacktestSimulator {
    config: BacktestConfig,
    engine: DecisionEngine,
    combiner: SignalCombiner,
    kelly: Option<(KellySizer, usize)>,
}

impl BacktestSimulator {
    pub fn new(config: BacktestConfig, engine: DecisionEngine, combiner: SignalCombiner) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            combiner,
            kelly: None,
        })
    }

    /// Size entries with the fractional-Kelly fraction once `min_trades` trades have closed
    pub fn with_kelly(mut self, kelly: &KellyConfig) -> Result<Self> {
        self.kelly = if kelly.enabled {
            Some((KellySizer::from_config(kelly)?, kelly.min_trades))
        } else {
            None
        };
        Ok(self)
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Replay `series` with its index-aligned `signals`
    ///
    /// Engine and combiner state are reset first, so repeated runs are
    /// independent.
    pub fn run(&mut self, series: &BarSeries, signals: &SignalSet) -> Result<BacktestReport> {
        if series.is_empty() {
            return Err(CoreError::insufficient("backtest", 1, 0));
        }
        if signals.len() != series.len() {
            return Err(CoreError::validation(format!(
                "signal set has {} bars, bar series has {}",
                signals.len(),
                series.len()
            )));
        }

        self.engine.reset();
        self.combiner.reset();
        let calendar = self.engine.calendar().clone();
        let bars = series.bars();

        tracing::info!(
            symbol = %self.config.symbol,
            bars = bars.len(),
            strategies = signals.strategy_count(),
            "Starting backtest"
        );

        let mut state = TradingState::new(self.config.initial_capital);
        let mut position: Option<OpenPosition> = None;
        let mut trades: Vec<BacktestTrade> = Vec::new();
        let mut decisions = Vec::new();
        let mut equity_curve = Vec::with_capacity(bars.len());
        let mut trips: BTreeMap<CircuitBreakerTrip, usize> = BTreeMap::new();

        for t in 0..bars.len() {
            let window = series.window(t)?;
            let bar = *window.current();
            let now = instant_from_millis(bar.timestamp)?;
            let day = calendar.trading_day(now);
            let combined = self.combiner.combine(&signals.view(t)?, &window)?;

            // A position never outlives its trading day, even when the
            // forced-close bar itself is missing
            if position.as_ref().is_some_and(|p| p.trading_day != day) {
                if let (Some(open), Some(prev)) = (position.take(), t.checked_sub(1).map(|i| &bars[i])) {
                    let trade = open.close(prev.close, prev.timestamp, ExitReason::ForcedClose, self.config.fee_pct);
                    self.record(&mut state, &mut trades, trade);
                }
            }
            state.roll_day(day);

            let mut closed_this_bar = false;
            if let Some(open) = position.take() {
                match self.exit_on_bar(&open, &bar, t, &calendar, &combined)? {
                    Some((reason, price)) => {
                        let trade = open.close(price, bar.timestamp, reason, self.config.fee_pct);
                        self.record(&mut state, &mut trades, trade);
                        closed_this_bar = true;
                    }
                    None => position = Some(open),
                }
            }

            if position.is_none() && !closed_this_bar && t >= self.config.warmup_bars {
                let ctx = DecisionContext {
                    symbol: &self.config.symbol,
                    window,
                    signal: &combined,
                    capital: state.equity,
                    risk_pct: self.kelly_risk_pct(&trades),
                };
                let decision = self.engine.decide(&ctx);

                if let (true, Some(plan)) = (decision.should_execute, decision.plan.as_ref()) {
                    match self.config.circuit_breakers.check(&state) {
                        Ok(()) => {
                            let opened = OpenPosition::from_plan(plan, bar.timestamp, t, day);
                            tracing::info!(
                                side = %opened.side,
                                entry = opened.entry_price,
                                stop = opened.stop_loss,
                                target = opened.take_profit,
                                quantity = opened.quantity,
                                "Opened position"
                            );
                            position = Some(opened);
                        }
                        Err(trip) => {
                            tracing::debug!("Circuit breaker blocked entry: {}", trip);
                            *trips.entry(trip).or_insert(0) += 1;
                        }
                    }
                }

                if decision.signal != 0 {
                    decisions.push(decision);
                }
            }

            let unrealized = position.as_ref().map_or(0.0, |p| p.unrealized_pnl(bar.close));
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                equity: state.equity + unrealized,
            });
        }

        // End of data
        if let (Some(open), Some(last)) = (position.take(), bars.last()) {
            let trade = open.close(last.close, last.timestamp, ExitReason::ForcedClose, self.config.fee_pct);
            self.record(&mut state, &mut trades, trade);
        }

        let metrics = BacktestMetrics::from_trades(&trades, self.config.initial_capital, trips);

        tracing::info!(
            "Backtest complete: {} trades, net P&L: ${:.2} ({:.2}%)",
            metrics.total_trades,
            metrics.net_pnl,
            metrics.net_return_pct
        );

        Ok(BacktestReport {
            symbol: self.config.symbol.clone(),
            trades,
            decisions,
            equity_curve,
            metrics,
        })
    }

    /// Exit triggered by this bar: stop/target, then reversal, then forced close
    fn exit_on_bar(
        &self,
        open: &OpenPosition,
        bar: &Bar,
        t: usize,
        calendar: &TradingCalendar,
        combined: &CombinedSignal,
    ) -> Result<Option<(ExitReason, f64)>> {
        // Fills happen at the decision bar, exits are checked from the next one
        if open.entry_index >= t {
            return Ok(None);
        }

        if let Some(hit) = self
            .config
            .intrabar_policy
            .resolve(open.side, open.stop_loss, open.take_profit, bar)
        {
            return Ok(Some(hit));
        }

        if self.config.exit_on_reversal && combined.signal == open.side.opposite().as_signal() {
            return Ok(Some((ExitReason::SignalReversal, bar.close)));
        }

        if calendar.should_force_close(instant_from_millis(bar.timestamp)?) {
            return Ok(Some((ExitReason::ForcedClose, bar.close)));
        }

        Ok(None)
    }

    fn record(&self, state: &mut TradingState, trades: &mut Vec<BacktestTrade>, trade: BacktestTrade) {
        tracing::info!(
            reason = %trade.exit_reason,
            exit = trade.exit_price,
            pnl = trade.net_pnl,
            "Closed position"
        );
        state.record_trade(trade.net_pnl);
        trades.push(trade);
    }

    fn kelly_risk_pct(&self, trades: &[BacktestTrade]) -> Option<f64> {
        let (kelly, min_trades) = self.kelly.as_ref()?;
        if trades.len() < *min_trades {
            return None;
        }
        kelly.from_trades(trades.iter().map(|t| t.net_pnl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::CombinerConfig;
    use crate::engine::EngineConfig;
    use crate::models::Signal;
    use chrono::{TimeZone, Utc};

    const BAR_MS: i64 = 15 * 60_000;

    fn day_start(day: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap().timestamp_millis()
    }

    /// Flat bars from 00:00 to 23:45 on each day
    fn flat_days(days: &[u32]) -> Vec<Bar> {
        days.iter()
            .flat_map(|d| {
                (0..96).map(move |i| Bar::new(day_start(*d) + i * BAR_MS, 100.0, 100.5, 99.5, 100.0, 1000.0))
            })
            .collect()
    }

    fn always(len: usize, signal: Signal) -> SignalSet {
        let mut series = BTreeMap::new();
        series.insert("fixed".to_string(), vec![Some(signal); len]);
        SignalSet::new(series).unwrap()
    }

    fn simulator(config: BacktestConfig) -> BacktestSimulator {
        let engine = DecisionEngine::new(&EngineConfig::default()).unwrap();
        let combiner = SignalCombiner::new(CombinerConfig::default()).unwrap();
        BacktestSimulator::new(config, engine, combiner).unwrap()
    }

    fn no_fee_config() -> BacktestConfig {
        BacktestConfig {
            fee_pct: 0.0,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn test_flat_market_exits_at_forced_close() {
        let bars = flat_days(&[5]);
        let n = bars.len();
        let series = BarSeries::new(bars, BAR_MS).unwrap();
        let report = simulator(no_fee_config()).run(&series, &always(n, Signal::long())).unwrap();

        // One window-A trade, window B skipped, closed at 16:45
        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::ForcedClose);
        let forced_close = Utc.with_ymd_and_hms(2024, 3, 5, 16, 45, 0).unwrap().timestamp_millis();
        assert_eq!(trade.exit_ts, forced_close);
        assert_eq!(trade.entry_ts, Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap().timestamp_millis());

        assert_eq!(report.equity_curve.len(), n);
        let executed = report.decisions.iter().filter(|d| d.should_execute).count();
        assert_eq!(executed, 1);
    }

    #[test]
    fn test_stop_loss_hit() {
        let mut bars = flat_days(&[5]);
        // 10:00 bar crashes through any stop
        let idx = 40;
        bars[idx] = Bar::new(bars[idx].timestamp, 100.0, 100.0, 80.0, 81.0, 1000.0);
        let n = bars.len();
        let series = BarSeries::new(bars, BAR_MS).unwrap();

        let report = simulator(no_fee_config()).run(&series, &always(n, Signal::long())).unwrap();
        let trade = &report.trades[0];

        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, trade.stop_loss);
        // Loss equals the 1% risk budget
        assert!((trade.pnl + 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_trade_per_day_after_stop_out() {
        let mut bars = flat_days(&[5]);
        bars[40] = Bar::new(bars[40].timestamp, 100.0, 100.0, 80.0, 81.0, 1000.0);
        let n = bars.len();
        let series = BarSeries::new(bars, BAR_MS).unwrap();
        let config = BacktestConfig {
            circuit_breakers: CircuitBreakers {
                enabled: false,
                ..CircuitBreakers::default()
            },
            ..no_fee_config()
        };

        let report = simulator(config).run(&series, &always(n, Signal::long())).unwrap();

        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(report.decisions.iter().filter(|d| d.should_execute).count(), 1);
        assert!(report
            .decisions
            .iter()
            .any(|d| d.state == crate::engine::DecisionState::WindowAlreadyExecuted));
    }

    #[test]
    fn test_signal_reversal_exit() {
        let bars = flat_days(&[5]);
        let n = bars.len();
        let series = BarSeries::new(bars, BAR_MS).unwrap();

        // Long until 11:00, short afterwards
        let flip = 44;
        let values: Vec<Option<Signal>> = (0..n)
            .map(|i| Some(if i < flip { Signal::long() } else { Signal::short() }))
            .collect();
        let mut series_map = BTreeMap::new();
        series_map.insert("fixed".to_string(), values);
        let signals = SignalSet::new(series_map).unwrap();

        let report = simulator(no_fee_config()).run(&series, &signals).unwrap();
        assert_eq!(report.trades[0].exit_reason, ExitReason::SignalReversal);
        assert_eq!(report.trades[0].exit_ts, series.bars()[flip].timestamp);
    }

    #[test]
    fn test_day_change_closes_position() {
        // 5th ends at 12:00, next bars start on the 6th
        let mut bars: Vec<Bar> = flat_days(&[5]).into_iter().take(49).collect();
        bars.extend(flat_days(&[6]));
        let n = bars.len();
        let series = BarSeries::new(bars, BAR_MS).unwrap();

        let report = simulator(no_fee_config()).run(&series, &always(n, Signal::long())).unwrap();
        let first = &report.trades[0];
        assert_eq!(first.exit_reason, ExitReason::ForcedClose);
        assert_eq!(first.exit_ts, series.bars()[48].timestamp);
        assert_eq!(report.trades.len(), 2);
    }

    #[test]
    fn test_circuit_breakers_counted() {
        let config = BacktestConfig {
            circuit_breakers: CircuitBreakers {
                max_consecutive_losses: 1,
                ..CircuitBreakers::default()
            },
            ..no_fee_config()
        };
        let mut config_skip = EngineConfig::default();
        config_skip.calendar.skip_window_b_after_a = false;
        let engine = DecisionEngine::new(&config_skip).unwrap();
        let combiner = SignalCombiner::new(CombinerConfig::default()).unwrap();
        let mut sim = BacktestSimulator::new(config, engine, combiner).unwrap();

        let mut bars = flat_days(&[5]);
        bars[40] = Bar::new(bars[40].timestamp, 100.0, 100.0, 80.0, 81.0, 1000.0);
        for bar in bars.iter_mut().skip(41) {
            *bar = Bar::new(bar.timestamp, 81.0, 81.5, 80.5, 81.0, 1000.0);
        }
        let n = bars.len();
        let series = BarSeries::new(bars, BAR_MS).unwrap();

        let report = sim.run(&series, &always(n, Signal::long())).unwrap();
        assert_eq!(report.trades.len(), 1);
        assert!(report.metrics.circuit_breaker_hits > 0);
    }

    #[test]
    fn test_rejects_misaligned_signals() {
        let bars = flat_days(&[5]);
        let series = BarSeries::new(bars, BAR_MS).unwrap();
        let err = simulator(no_fee_config())
            .run(&series, &always(10, Signal::long()))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_runs_are_independent() {
        let bars = flat_days(&[5, 6]);
        let n = bars.len();
        let series = BarSeries::new(bars, BAR_MS).unwrap();
        let signals = always(n, Signal::short());

        let mut sim = simulator(BacktestConfig::default());
        let first = sim.run(&series, &signals).unwrap();
        let second = sim.run(&series, &signals).unwrap();

        assert_eq!(first.trades, second.trades);
        assert_eq!(first.trades.len(), 2);
        assert!(first.trades.iter().all(|t| t.fees > 0.0));
    }
}

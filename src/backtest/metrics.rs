use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::position::{BacktestTrade, ExitReason};
use crate::models::Side;
use crate::risk::CircuitBreakerTrip;

/// Complete backtest performance metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestMetrics {
    // P&L Metrics
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub initial_capital: f64,
    pub final_capital: f64,

    // Trade Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub long_trades: usize,
    pub short_trades: usize,
    pub win_rate: f64,

    // P&L Distribution
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64, // Total wins / Total losses

    // Risk Metrics
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,

    // Holding Period
    pub avg_holding_period_minutes: f64,
    pub max_holding_period_minutes: i64,
    pub min_holding_period_minutes: i64,

    // Transaction Costs
    pub total_fees: f64,
    pub net_pnl: f64, // total_pnl - total_fees
    pub net_return_pct: f64,

    pub exit_reasons: BTreeMap<ExitReason, usize>,

    // Circuit Breakers
    pub circuit_breaker_hits: usize,
    pub circuit_breaker_trips: BTreeMap<CircuitBreakerTrip, usize>,
}

impl BacktestMetrics {
    /// Calculate metrics from closed trades
    pub fn from_trades(
        trades: &[BacktestTrade],
        initial_capital: f64,
        circuit_breaker_trips: BTreeMap<CircuitBreakerTrip, usize>,
    ) -> Self {
        let circuit_breaker_hits = circuit_breaker_trips.values().sum();
        let total_trades = trades.len();

        if total_trades == 0 {
            return Self::empty(initial_capital, circuit_breaker_hits, circuit_breaker_trips);
        }

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let total_fees: f64 = trades.iter().map(|t| t.fees).sum();
        let net_pnl = total_pnl - total_fees;

        // Win/Loss statistics, on net P&L
        let winning: Vec<f64> = trades.iter().map(|t| t.net_pnl).filter(|p| *p > 0.0).collect();
        let losing: Vec<f64> = trades.iter().map(|t| t.net_pnl).filter(|p| *p <= 0.0).collect();

        let win_rate = (winning.len() as f64 / total_trades as f64) * 100.0;

        let total_wins: f64 = winning.iter().sum();
        let total_losses: f64 = losing.iter().map(|p| p.abs()).sum();

        let avg_win = if winning.is_empty() {
            0.0
        } else {
            total_wins / winning.len() as f64
        };
        let avg_loss = if losing.is_empty() {
            0.0
        } else {
            total_losses / losing.len() as f64
        };

        let largest_win = winning.iter().copied().fold(0.0, f64::max);
        let largest_loss = losing.iter().copied().fold(0.0, f64::min);

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = Self::calculate_drawdown(trades, initial_capital);
        let sharpe_ratio = Self::calculate_sharpe_ratio(trades);

        let holding: Vec<i64> = trades.iter().map(|t| t.holding_period_minutes()).collect();
        let avg_holding_period_minutes = holding.iter().sum::<i64>() as f64 / holding.len() as f64;

        let mut exit_reasons = BTreeMap::new();
        for trade in trades {
            *exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;
        }

        Self {
            total_pnl,
            total_return_pct: total_pnl / initial_capital * 100.0,
            initial_capital,
            final_capital: initial_capital + net_pnl,
            total_trades,
            winning_trades: winning.len(),
            losing_trades: losing.len(),
            long_trades: trades.iter().filter(|t| t.side == Side::Long).count(),
            short_trades: trades.iter().filter(|t| t.side == Side::Short).count(),
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio,
            avg_holding_period_minutes,
            max_holding_period_minutes: holding.iter().copied().max().unwrap_or(0),
            min_holding_period_minutes: holding.iter().copied().min().unwrap_or(0),
            total_fees,
            net_pnl,
            net_return_pct: net_pnl / initial_capital * 100.0,
            exit_reasons,
            circuit_breaker_hits,
            circuit_breaker_trips,
        }
    }

    /// Empty metrics for when no trades occurred
    fn empty(
        initial_capital: f64,
        circuit_breaker_hits: usize,
        circuit_breaker_trips: BTreeMap<CircuitBreakerTrip, usize>,
    ) -> Self {
        Self {
            total_pnl: 0.0,
            total_return_pct: 0.0,
            initial_capital,
            final_capital: initial_capital,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            long_trades: 0,
            short_trades: 0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            sharpe_ratio: 0.0,
            avg_holding_period_minutes: 0.0,
            max_holding_period_minutes: 0,
            min_holding_period_minutes: 0,
            total_fees: 0.0,
            net_pnl: 0.0,
            net_return_pct: 0.0,
            exit_reasons: BTreeMap::new(),
            circuit_breaker_hits,
            circuit_breaker_trips,
        }
    }

    /// Maximum peak-to-trough decline of realized equity
    fn calculate_drawdown(trades: &[BacktestTrade], initial_capital: f64) -> (f64, f64) {
        let mut peak = initial_capital;
        let mut max_dd = 0.0;
        let mut max_dd_pct = 0.0;
        let mut equity = initial_capital;

        for trade in trades {
            equity += trade.net_pnl;
            if equity > peak {
                peak = equity;
            }

            let drawdown = peak - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
                max_dd_pct = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
            }
        }

        (max_dd, max_dd_pct)
    }

    /// Sharpe ratio over per-trade returns, risk-free rate 0
    fn calculate_sharpe_ratio(trades: &[BacktestTrade]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns
            .iter()
            .map(|r| {
                let diff = r - mean_return;
                diff * diff
            })
            .sum::<f64>()
            / returns.len() as f64;

        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            mean_return / std_dev
        } else {
            0.0
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n========================================================");
        println!("              BACKTEST PERFORMANCE REPORT");
        println!("========================================================\n");

        println!("P&L SUMMARY");
        println!("  Initial Capital:       ${:.2}", self.initial_capital);
        println!("  Final Capital:         ${:.2}", self.final_capital);
        println!(
            "  Gross P&L:             ${:.2} ({:+.2}%)",
            self.total_pnl, self.total_return_pct
        );
        println!("  Fees:                  ${:.2}", self.total_fees);
        println!(
            "  Net P&L:               ${:.2} ({:+.2}%)",
            self.net_pnl, self.net_return_pct
        );

        println!("\nTRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!("  Long / Short:          {} / {}", self.long_trades, self.short_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);

        if self.total_trades > 0 {
            println!("\nWIN/LOSS ANALYSIS");
            println!("  Average Win:           ${:.2}", self.avg_win);
            println!("  Average Loss:          ${:.2}", self.avg_loss);
            println!("  Largest Win:           ${:.2}", self.largest_win);
            println!("  Largest Loss:          ${:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);

            println!("\nRISK METRICS");
            println!(
                "  Max Drawdown:          ${:.2} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );
            println!("  Sharpe Ratio:          {:.2}", self.sharpe_ratio);

            println!("\nHOLDING PERIODS");
            println!(
                "  Average:               {:.1} minutes ({:.1} hours)",
                self.avg_holding_period_minutes,
                self.avg_holding_period_minutes / 60.0
            );
            println!("  Max:                   {} minutes", self.max_holding_period_minutes);
            println!("  Min:                   {} minutes", self.min_holding_period_minutes);

            println!("\nEXIT REASONS");
            for (reason, count) in &self.exit_reasons {
                println!("  {:<22} {}", format!("{}:", reason), count);
            }
        }

        println!("\nCIRCUIT BREAKERS");
        println!("  Triggered:             {} times", self.circuit_breaker_hits);
        for (trip, count) in &self.circuit_breaker_trips {
            println!("    {}: {}", trip, count);
        }

        println!("\n========================================================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_test_trade(pnl: f64, holding_minutes: i64, exit_reason: ExitReason) -> BacktestTrade {
        let entry_price = 100.0;
        let quantity = 1.0;
        BacktestTrade {
            side: Side::Long,
            entry_price,
            exit_price: entry_price + pnl / quantity,
            stop_loss: 95.0,
            take_profit: 110.0,
            quantity,
            entry_ts: 0,
            exit_ts: holding_minutes * 60_000,
            trading_day: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            exit_reason,
            pnl,
            pnl_pct: pnl / entry_price * 100.0,
            fees: 0.0,
            net_pnl: pnl,
        }
    }

    #[test]
    fn test_metrics_with_winning_trades() {
        let trades = vec![
            create_test_trade(100.0, 60, ExitReason::TakeProfit), // $100 profit
            create_test_trade(50.0, 120, ExitReason::ForcedClose), // $50 profit
            create_test_trade(-30.0, 90, ExitReason::StopLoss),   // $30 loss
        ];

        let metrics = BacktestMetrics::from_trades(&trades, 10000.0, BTreeMap::new());

        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert!((metrics.win_rate - 66.66).abs() < 0.1);
        assert!((metrics.total_pnl - 120.0).abs() < 0.01);
        assert!((metrics.final_capital - 10120.0).abs() < 0.01);
        assert_eq!(metrics.exit_reasons[&ExitReason::StopLoss], 1);
        assert_eq!(metrics.max_holding_period_minutes, 120);
    }

    #[test]
    fn test_metrics_with_no_trades() {
        let mut trips = BTreeMap::new();
        trips.insert(CircuitBreakerTrip::DailyLoss, 2);
        let metrics = BacktestMetrics::from_trades(&[], 10000.0, trips);

        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.total_pnl, 0.0);
        assert_eq!(metrics.circuit_breaker_hits, 2);
    }

    #[test]
    fn test_profit_factor_calculation() {
        let trades = vec![
            create_test_trade(200.0, 60, ExitReason::TakeProfit), // $200 win
            create_test_trade(100.0, 60, ExitReason::TakeProfit), // $100 win
            create_test_trade(-50.0, 60, ExitReason::StopLoss),   // $50 loss
        ];

        let metrics = BacktestMetrics::from_trades(&trades, 10000.0, BTreeMap::new());

        // Profit factor = Total wins / Total losses = 300 / 50 = 6.0
        assert!((metrics.profit_factor - 6.0).abs() < 0.01);
    }

    #[test]
    fn test_drawdown_calculation() {
        let trades = vec![
            create_test_trade(100.0, 60, ExitReason::TakeProfit), // Peak at 10100
            create_test_trade(-200.0, 60, ExitReason::StopLoss),  // Down to 9900 (drawdown: 200)
            create_test_trade(50.0, 60, ExitReason::TakeProfit),  // Back to 9950
        ];

        let metrics = BacktestMetrics::from_trades(&trades, 10000.0, BTreeMap::new());

        assert!((metrics.max_drawdown - 200.0).abs() < 0.01);
        assert!((metrics.max_drawdown_pct - 200.0 / 10100.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_fees_reduce_net_pnl() {
        let mut trade = create_test_trade(10.0, 15, ExitReason::TakeProfit);
        trade.fees = 12.0;
        trade.net_pnl = -2.0;

        let metrics = BacktestMetrics::from_trades(&[trade], 1000.0, BTreeMap::new());
        assert!((metrics.net_pnl + 2.0).abs() < 1e-9);
        assert_eq!(metrics.losing_trades, 1);
        assert!((metrics.net_return_pct + 0.2).abs() < 1e-9);
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::TradePlan;
use crate::models::Side;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalReversal,
    ForcedClose,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::SignalReversal => "signal_reversal",
            Self::ForcedClose => "forced_close",
        };
        write!(f, "{}", s)
    }
}

/// The single open position of a simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub quantity: f64,
    pub entry_ts: i64,
    pub entry_index: usize,
    pub trading_day: NaiveDate,
}

impl OpenPosition {
    pub fn from_plan(plan: &TradePlan, entry_ts: i64, entry_index: usize, trading_day: NaiveDate) -> Self {
        Self {
            side: plan.side,
            entry_price: plan.entry.entry_price,
            stop_loss: plan.stops.stop_loss,
            take_profit: plan.stops.take_profit,
            quantity: plan.size.quantity,
            entry_ts,
            entry_index,
            trading_day,
        }
    }

    /// Mark-to-market P&L at `price`
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.quantity
    }

    /// Close the position; `fee_pct` is the round-trip cost fraction
    pub fn close(self, exit_price: f64, exit_ts: i64, exit_reason: ExitReason, fee_pct: f64) -> BacktestTrade {
        let pnl = self.unrealized_pnl(exit_price);
        let pnl_pct = self.side.sign() * (exit_price / self.entry_price - 1.0) * 100.0;
        let fees = (self.entry_price + exit_price) * self.quantity * (fee_pct / 2.0);

        BacktestTrade {
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            quantity: self.quantity,
            entry_ts: self.entry_ts,
            exit_ts,
            trading_day: self.trading_day,
            exit_reason,
            pnl,
            pnl_pct,
            fees,
            net_pnl: pnl - fees,
        }
    }
}

/// Immutable record of a closed position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestTrade {
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub quantity: f64,
    pub entry_ts: i64,
    pub exit_ts: i64,
    pub trading_day: NaiveDate,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,
    pub net_pnl: f64,
}

impl BacktestTrade {
    pub fn holding_period_minutes(&self) -> i64 {
        (self.exit_ts - self.entry_ts) / 60_000
    }
}

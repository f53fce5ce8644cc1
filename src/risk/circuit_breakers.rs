use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Result;

/// Circuit breakers consulted before every new entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakers {
    pub enabled: bool,
    pub max_daily_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_consecutive_losses: u32,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self {
            enabled: true,
            max_daily_loss_pct: 0.05,  // -5% daily
            max_drawdown_pct: 0.20,    // -20% from peak
            max_consecutive_losses: 5, // 5 losses in a row
        }
    }
}

/// Running account state the breakers are evaluated against
#[derive(Debug, Clone)]
pub struct TradingState {
    pub equity: f64,
    pub peak_equity: f64,
    pub daily_pnl: f64,
    pub consecutive_losses: u32,
    pub trading_day: Option<NaiveDate>,
}

impl TradingState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            equity: initial_capital,
            peak_equity: initial_capital,
            daily_pnl: 0.0,
            consecutive_losses: 0,
            trading_day: None,
        }
    }

    /// Reset the daily counters when the trading day changes
    pub fn roll_day(&mut self, day: NaiveDate) {
        if self.trading_day != Some(day) {
            self.trading_day = Some(day);
            self.daily_pnl = 0.0;
        }
    }

    pub fn record_trade(&mut self, pnl: f64) {
        self.equity += pnl;
        self.daily_pnl += pnl;
        if self.equity > self.peak_equity {
            self.peak_equity = self.equity;
        }
        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    pub fn drawdown(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        (self.peak_equity - self.equity) / self.peak_equity
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerTrip {
    DailyLoss,
    MaxDrawdown,
    ConsecutiveLosses,
}

impl std::fmt::Display for CircuitBreakerTrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyLoss => write!(f, "daily loss limit reached"),
            Self::MaxDrawdown => write!(f, "maximum drawdown reached"),
            Self::ConsecutiveLosses => write!(f, "too many consecutive losses"),
        }
    }
}

impl CircuitBreakers {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_daily_loss_pct > 0.0 && self.max_daily_loss_pct <= 1.0) {
            return Err(CoreError::validation(format!(
                "max_daily_loss_pct must be within (0, 1], got {}",
                self.max_daily_loss_pct
            )));
        }
        if !(self.max_drawdown_pct > 0.0 && self.max_drawdown_pct <= 1.0) {
            return Err(CoreError::validation(format!(
                "max_drawdown_pct must be within (0, 1], got {}",
                self.max_drawdown_pct
            )));
        }
        if self.max_consecutive_losses == 0 {
            return Err(CoreError::validation("max_consecutive_losses must be positive"));
        }
        Ok(())
    }

    pub fn check(&self, state: &TradingState) -> std::result::Result<(), CircuitBreakerTrip> {
        if !self.enabled {
            return Ok(());
        }

        // Daily loss is measured against equity at the start of the day
        let day_start = state.equity - state.daily_pnl;
        if day_start > 0.0 && state.daily_pnl / day_start <= -self.max_daily_loss_pct {
            return Err(CircuitBreakerTrip::DailyLoss);
        }

        if state.drawdown() >= self.max_drawdown_pct {
            return Err(CircuitBreakerTrip::MaxDrawdown);
        }

        if state.consecutive_losses >= self.max_consecutive_losses {
            return Err(CircuitBreakerTrip::ConsecutiveLosses);
        }

        Ok(())
    }
}

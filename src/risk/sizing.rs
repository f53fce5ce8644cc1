//! Fixed-risk position sizing and the fractional-Kelly risk fraction.
//!
//! `PositionSizer` turns a risk fraction into a quantity. `KellySizer`
//! only decides the fraction; the two are kept apart so either side can
//! change without touching the other.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Result;

/// Hard ceiling on the fraction of capital risked per trade
pub const MAX_RISK_PCT: f64 = 0.10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizingConfig {
    /// Fraction of capital lost on a full stop-out
    pub risk_pct: f64,
    /// Upper bound for `risk_pct`, itself at most 10%
    pub max_risk_pct: f64,
    pub kelly: KellyConfig,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_pct: 0.01,
            max_risk_pct: MAX_RISK_PCT,
            kelly: KellyConfig::default(),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_risk_pct > 0.0 && self.max_risk_pct <= MAX_RISK_PCT) {
            return Err(CoreError::validation(format!(
                "max_risk_pct must be within (0, {}], got {}",
                MAX_RISK_PCT, self.max_risk_pct
            )));
        }
        if !(self.risk_pct > 0.0 && self.risk_pct <= self.max_risk_pct) {
            return Err(CoreError::validation(format!(
                "risk_pct must be within (0, {}], got {}",
                self.max_risk_pct, self.risk_pct
            )));
        }
        self.kelly.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KellyConfig {
    /// Feed the Kelly fraction into the sizer once enough trades exist
    pub enabled: bool,
    pub fraction: f64,
    pub max_fraction: f64,
    pub min_trades: usize,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fraction: 0.25,
            max_fraction: 0.02,
            min_trades: 20,
        }
    }
}

impl KellyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fraction > 0.0 && self.fraction <= 1.0) {
            return Err(CoreError::validation(format!(
                "kelly fraction must be within (0, 1], got {}",
                self.fraction
            )));
        }
        if !(self.max_fraction > 0.0 && self.max_fraction <= MAX_RISK_PCT) {
            return Err(CoreError::validation(format!(
                "kelly max_fraction must be within (0, {}], got {}",
                MAX_RISK_PCT, self.max_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionSize {
    pub quantity: f64,
    pub notional_value: f64,
    pub risk_amount: f64,
    pub risk_pct: f64,
}

/// Fixed-risk sizer: a full stop-out loses exactly `capital × risk_pct`
#[derive(Debug, Clone)]
pub struct PositionSizer {
    max_risk_pct: f64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            max_risk_pct: MAX_RISK_PCT,
        }
    }
}

impl PositionSizer {
    pub fn new(max_risk_pct: f64) -> Result<Self> {
        if !(max_risk_pct > 0.0 && max_risk_pct <= MAX_RISK_PCT) {
            return Err(CoreError::validation(format!(
                "max_risk_pct must be within (0, {}], got {}",
                MAX_RISK_PCT, max_risk_pct
            )));
        }
        Ok(Self { max_risk_pct })
    }

    pub fn max_risk_pct(&self) -> f64 {
        self.max_risk_pct
    }

    pub fn size(&self, capital: f64, risk_pct: f64, entry: f64, stop: f64) -> Result<PositionSize> {
        if !(capital.is_finite() && capital > 0.0) {
            return Err(CoreError::validation(format!("capital must be positive, got {}", capital)));
        }
        if !(risk_pct > 0.0 && risk_pct <= self.max_risk_pct) {
            return Err(CoreError::validation(format!(
                "risk_pct must be within (0, {}], got {}",
                self.max_risk_pct, risk_pct
            )));
        }
        if !(entry.is_finite() && entry > 0.0 && stop.is_finite() && stop > 0.0) {
            return Err(CoreError::validation(format!(
                "entry and stop must be positive, got {} / {}",
                entry, stop
            )));
        }

        let stop_distance = (entry - stop).abs();
        if stop_distance == 0.0 {
            return Err(CoreError::validation("entry price equals stop price"));
        }

        let risk_amount = capital * risk_pct;
        let quantity = risk_amount / stop_distance;

        Ok(PositionSize {
            quantity,
            notional_value: quantity * entry,
            risk_amount,
            risk_pct,
        })
    }
}

/// Fractional Kelly: `f = fraction × (p·R − (1 − p)) / R`, floored at 0 and capped
#[derive(Debug, Clone)]
pub struct KellySizer {
    fraction: f64,
    max_fraction: f64,
}

impl KellySizer {
    pub fn new(fraction: f64, max_fraction: f64) -> Result<Self> {
        KellyConfig {
            enabled: true,
            fraction,
            max_fraction,
            min_trades: 0,
        }
        .validate()?;
        Ok(Self {
            fraction,
            max_fraction,
        })
    }

    pub fn from_config(config: &KellyConfig) -> Result<Self> {
        Self::new(config.fraction, config.max_fraction)
    }

    /// Risk fraction for a win rate `p` and average-win / average-loss ratio `r`
    pub fn risk_fraction(&self, win_rate: f64, win_loss_ratio: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&win_rate) {
            return Err(CoreError::validation(format!(
                "win rate must be within [0, 1], got {}",
                win_rate
            )));
        }
        if !(win_loss_ratio.is_finite() && win_loss_ratio > 0.0) {
            return Err(CoreError::validation(format!(
                "win/loss ratio must be positive, got {}",
                win_loss_ratio
            )));
        }

        let kelly = (win_rate * win_loss_ratio - (1.0 - win_rate)) / win_loss_ratio;
        Ok((self.fraction * kelly).clamp(0.0, self.max_fraction))
    }

    /// Risk fraction from closed-trade P&L history
    ///
    /// `None` when the history has no wins or no losses, since the
    /// win/loss ratio is undefined there.
    pub fn from_trades<I>(&self, pnls: I) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        let (mut wins, mut losses) = (Vec::new(), Vec::new());
        for pnl in pnls {
            if pnl > 0.0 {
                wins.push(pnl);
            } else if pnl < 0.0 {
                losses.push(-pnl);
            }
        }
        if wins.is_empty() || losses.is_empty() {
            return None;
        }

        let decided = (wins.len() + losses.len()) as f64;
        let win_rate = wins.len() as f64 / decided;
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;

        self.risk_fraction(win_rate, avg_win / avg_loss).ok()
    }
}

//! Stop-loss and take-profit placement.
//!
//! Three placement methods share one post-processing pipeline:
//! 1. optional volatility-regime scaling of the stop distance
//! 2. stop distance clamped into `[min_stop_pct, max_stop_pct]` of entry
//! 3. reward raised to at least `risk × min_rr`
//! 4. reward capped at `risk × max_rr` (target pulled in, never pushed out)

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::indicators::{latest_atr, volatility_regime, VolatilityRegime};
use crate::models::{Bar, Side};
use crate::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    Volatility,
    Structure,
    Hybrid,
}

/// Scales the stop distance by the current volatility regime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegimeAdjustment {
    pub enabled: bool,
    /// Trailing ATR values the current ATR is ranked against
    pub lookback: usize,
    pub low_percentile: f64,
    pub high_percentile: f64,
    pub low_vol_scale: f64,
    pub high_vol_scale: f64,
}

impl Default for RegimeAdjustment {
    fn default() -> Self {
        Self {
            enabled: false,
            lookback: 100,
            low_percentile: 0.25,
            high_percentile: 0.75,
            low_vol_scale: 0.8,
            high_vol_scale: 1.25,
        }
    }
}

impl RegimeAdjustment {
    pub fn scale(&self, regime: VolatilityRegime) -> f64 {
        match regime {
            VolatilityRegime::Low => self.low_vol_scale,
            VolatilityRegime::Normal => 1.0,
            VolatilityRegime::High => self.high_vol_scale,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StopConfig {
    pub method: StopMethod,
    pub atr_period: usize,
    pub k_sl: f64,
    pub k_tp: f64,
    pub min_rr: f64,
    pub max_rr: f64,
    pub min_stop_pct: f64,
    pub max_stop_pct: f64,
    /// Bars scanned for swing highs and lows by the structure method
    pub structure_lookback: usize,
    /// Distance beyond the swing extreme, in ATRs
    pub structure_buffer_atr: f64,
    pub regime: RegimeAdjustment,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            method: StopMethod::Volatility,
            atr_period: 14,
            k_sl: 2.0,
            k_tp: 3.0,
            min_rr: 1.5,
            max_rr: 4.0,
            min_stop_pct: 0.002,
            max_stop_pct: 0.05,
            structure_lookback: 20,
            structure_buffer_atr: 0.25,
            regime: RegimeAdjustment::default(),
        }
    }
}

impl StopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.atr_period == 0 {
            return Err(CoreError::validation("atr_period must be positive"));
        }
        if !(self.k_sl > 0.0 && self.k_tp > 0.0) {
            return Err(CoreError::validation(format!(
                "k_sl and k_tp must be positive, got {} / {}",
                self.k_sl, self.k_tp
            )));
        }
        if !(self.min_rr > 0.0 && self.min_rr <= self.max_rr) {
            return Err(CoreError::validation(format!(
                "risk/reward bounds need 0 < min <= max, got {} / {}",
                self.min_rr, self.max_rr
            )));
        }
        if !(self.min_stop_pct > 0.0 && self.min_stop_pct <= self.max_stop_pct && self.max_stop_pct < 1.0) {
            return Err(CoreError::validation(format!(
                "stop distance bounds need 0 < min <= max < 1, got {} / {}",
                self.min_stop_pct, self.max_stop_pct
            )));
        }
        if self.structure_lookback == 0 {
            return Err(CoreError::validation("structure_lookback must be positive"));
        }
        if !(self.structure_buffer_atr >= 0.0) {
            return Err(CoreError::validation("structure_buffer_atr must be non-negative"));
        }
        let regime = &self.regime;
        if regime.enabled
            && (regime.lookback == 0
                || !(regime.low_percentile < regime.high_percentile)
                || !(regime.low_vol_scale > 0.0 && regime.high_vol_scale > 0.0))
        {
            return Err(CoreError::validation("invalid volatility regime adjustment"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StopTargetPlan {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub atr_value: f64,
    pub risk_reward_ratio: f64,
    pub method: StopMethod,
    pub regime: Option<VolatilityRegime>,
}

#[derive(Debug, Clone, Default)]
pub struct StopTargetCalculator {
    config: StopConfig,
}

impl StopTargetCalculator {
    pub fn new(config: StopConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StopConfig {
        &self.config
    }

    /// Compute ATR from `bars` and place stop and target around `entry`
    pub fn calculate(&self, entry: f64, side: Side, bars: &[Bar]) -> Result<StopTargetPlan> {
        let atr = latest_atr(bars, self.config.atr_period)?;
        self.calculate_with_atr(entry, side, atr, bars)
    }

    /// Place stop and target with a precomputed ATR
    ///
    /// `bars` is only read by the structure and hybrid methods and by the
    /// regime adjustment.
    pub fn calculate_with_atr(&self, entry: f64, side: Side, atr: f64, bars: &[Bar]) -> Result<StopTargetPlan> {
        if !(entry.is_finite() && entry > 0.0) {
            return Err(CoreError::validation(format!("entry price must be positive, got {}", entry)));
        }
        if !(atr.is_finite() && atr > 0.0) {
            return Err(CoreError::validation(format!("ATR must be positive, got {}", atr)));
        }

        let cfg = &self.config;
        let sign = side.sign();

        // Distances from entry, both positive
        let (risk, reward) = match cfg.method {
            StopMethod::Volatility => (atr * cfg.k_sl, atr * cfg.k_tp),
            StopMethod::Structure => {
                let swing = self.swing(entry, side, atr, bars)?;
                let risk = swing.risk.unwrap_or(atr * cfg.k_sl);
                let reward = swing
                    .reward
                    .filter(|r| *r >= risk * cfg.min_rr)
                    .unwrap_or(risk * cfg.min_rr);
                (risk, reward)
            }
            StopMethod::Hybrid => {
                let swing = self.swing(entry, side, atr, bars)?;
                let risk = swing.risk.map_or(atr * cfg.k_sl, |r| r.max(atr * cfg.k_sl));
                let base = risk * cfg.min_rr;
                let reward = swing.reward.filter(|r| *r > base).unwrap_or(base);
                (risk, reward)
            }
        };

        let regime = if cfg.regime.enabled {
            volatility_regime(
                bars,
                cfg.atr_period,
                cfg.regime.lookback,
                cfg.regime.low_percentile,
                cfg.regime.high_percentile,
            )
        } else {
            None
        };
        let scaled = risk * regime.map_or(1.0, |r| cfg.regime.scale(r));

        let risk = scaled.clamp(entry * cfg.min_stop_pct, entry * cfg.max_stop_pct);
        let reward = reward.max(risk * cfg.min_rr).min(risk * cfg.max_rr);

        let stop_loss = entry - sign * risk;
        let take_profit = entry + sign * reward;
        if take_profit <= 0.0 {
            return Err(CoreError::validation(format!(
                "take profit {:.8} is not a positive price",
                take_profit
            )));
        }

        Ok(StopTargetPlan {
            stop_loss,
            take_profit,
            atr_value: atr,
            risk_reward_ratio: reward / risk,
            method: cfg.method,
            regime,
        })
    }

    /// Swing-based risk and reward over the trailing lookback
    fn swing(&self, entry: f64, side: Side, atr: f64, bars: &[Bar]) -> Result<Swing> {
        let lookback = self.config.structure_lookback;
        if bars.len() < lookback {
            return Err(CoreError::insufficient(
                format!("swing structure({})", lookback),
                lookback,
                bars.len(),
            ));
        }

        let recent = &bars[bars.len() - lookback..];
        let high = recent.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = recent.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let buffer = atr * self.config.structure_buffer_atr;

        let (stop, target) = match side {
            Side::Long => (low - buffer, high),
            Side::Short => (high + buffer, low),
        };
        let sign = side.sign();

        // A stop on the wrong side of entry has no structural meaning
        let risk = Some(sign * (entry - stop)).filter(|r| *r > 0.0);
        let reward = Some(sign * (target - entry)).filter(|r| *r > 0.0);
        Ok(Swing { risk, reward })
    }
}

struct Swing {
    risk: Option<f64>,
    reward: Option<f64>,
}

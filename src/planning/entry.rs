use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::indicators::session_vwap;
use crate::models::{BarWindow, Side};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntryConfig {
    /// Fractional improvement applied to the reference mid
    pub beta: f64,
    /// Improvements smaller than this (vs the live price) snap to the live price
    pub min_distance: f64,
    /// Improvements are clamped to at most this far from the live price
    pub max_distance: f64,
    /// Half-width of the entry range in ATRs
    pub range_atr_mult: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            beta: 0.001,
            min_distance: 0.0005,
            max_distance: 0.005,
            range_atr_mult: 0.5,
        }
    }
}

impl EntryConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.beta) {
            return Err(CoreError::validation(format!("entry beta must be within [0, 1), got {}", self.beta)));
        }
        if !(self.min_distance >= 0.0 && self.min_distance <= self.max_distance && self.max_distance < 1.0) {
            return Err(CoreError::validation(format!(
                "entry distances need 0 <= min <= max < 1, got {} / {}",
                self.min_distance, self.max_distance
            )));
        }
        if !(self.range_atr_mult >= 0.0 && self.range_atr_mult.is_finite()) {
            return Err(CoreError::validation("range_atr_mult must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MidSource {
    Vwap,
    TypicalPrice,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EntryPlan {
    pub entry_price: f64,
    pub reference_mid: f64,
    pub mid_source: MidSource,
    /// Effective improvement vs the mid; 0 when snapped to the live price
    pub band_beta: f64,
    pub entry_low: f64,
    pub entry_high: f64,
}

/// Limit price slightly better than the session mid
///
/// Never fails: missing VWAP falls back to typical price and out-of-band
/// improvements are snapped or clamped.
#[derive(Debug, Clone, Default)]
pub struct EntryBandCalculator {
    config: EntryConfig,
}

impl EntryBandCalculator {
    pub fn new(config: EntryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EntryConfig {
        &self.config
    }

    /// Entry plan at the window's current bar
    ///
    /// `session_start_ms` bounds the VWAP; `atr` sizes the entry range and
    /// falls back to half the current bar's range when unavailable.
    pub fn plan(
        &self,
        side: Side,
        window: &BarWindow<'_>,
        session_start_ms: i64,
        atr: Option<f64>,
    ) -> EntryPlan {
        let bar = window.current();
        let live = bar.close;

        let (reference_mid, mid_source) = match session_vwap(window.bars(), session_start_ms) {
            Some(vwap) if vwap.is_finite() && vwap > 0.0 => (vwap, MidSource::Vwap),
            _ => (bar.typical_price(), MidSource::TypicalPrice),
        };

        let sign = side.sign();
        let raw = reference_mid * (1.0 - sign * self.config.beta);

        // Positive when the limit is better than the live price for this side
        let improvement = sign * (live - raw) / live;
        let (entry_price, band_beta) = if improvement < self.config.min_distance {
            (live, 0.0)
        } else if improvement > self.config.max_distance {
            let clamped = live * (1.0 - sign * self.config.max_distance);
            (clamped, sign * (reference_mid - clamped) / reference_mid)
        } else {
            (raw, self.config.beta)
        };

        let half_width = atr
            .filter(|a| a.is_finite() && *a > 0.0)
            .map(|a| a * self.config.range_atr_mult)
            .unwrap_or((bar.high - bar.low) / 2.0);
        let entry_low = (entry_price - half_width).max(f64::EPSILON);
        let entry_high = entry_price + half_width;

        EntryPlan {
            entry_price,
            reference_mid,
            mid_source,
            band_beta,
            entry_low,
            entry_high,
        }
    }
}

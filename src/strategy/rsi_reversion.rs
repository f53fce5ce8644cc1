use super::Strategy;
use crate::error::CoreError;
use crate::indicators::rsi;
use crate::models::{BarWindow, Signal};
use crate::Result;

/// Mean reversion on RSI extremes
///
/// Buys oversold, sells overbought. Strength grows with the distance
/// past the band.
#[derive(Debug, Clone)]
pub struct RsiReversionStrategy {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiReversionStrategy {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Result<Self> {
        if period == 0 {
            return Err(CoreError::validation("rsi_reversion period must be positive"));
        }
        if !(0.0 < oversold && oversold < overbought && overbought < 100.0) {
            return Err(CoreError::validation(format!(
                "rsi_reversion needs 0 < oversold < overbought < 100, got {} / {}",
                oversold, overbought
            )));
        }
        Ok(Self {
            period,
            oversold,
            overbought,
        })
    }
}

impl Default for RsiReversionStrategy {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl Strategy for RsiReversionStrategy {
    fn signal(&self, window: &BarWindow<'_>) -> Result<Signal> {
        let value = rsi(&window.closes(), self.period).ok_or_else(|| {
            CoreError::insufficient(self.name(), self.min_bars_required(), window.len())
        })?;

        if value < self.oversold {
            let strength = ((self.oversold - value) / self.oversold).clamp(0.0, 1.0);
            Signal::new(1, Some(strength))
        } else if value > self.overbought {
            let strength = ((value - self.overbought) / (100.0 - self.overbought)).clamp(0.0, 1.0);
            Signal::new(-1, Some(strength))
        } else {
            Ok(Signal::flat())
        }
    }

    fn name(&self) -> &str {
        "rsi_reversion"
    }

    fn min_bars_required(&self) -> usize {
        self.period + 1
    }
}

use super::Strategy;
use crate::error::CoreError;
use crate::models::{BarWindow, Signal};
use crate::Result;

/// Channel breakout: close beyond the prior `lookback` bars' high or low
#[derive(Debug, Clone)]
pub struct BreakoutStrategy {
    lookback: usize,
}

impl BreakoutStrategy {
    pub fn new(lookback: usize) -> Result<Self> {
        if lookback == 0 {
            return Err(CoreError::validation("breakout lookback must be positive"));
        }
        Ok(Self { lookback })
    }
}

impl Default for BreakoutStrategy {
    fn default() -> Self {
        Self { lookback: 20 }
    }
}

impl Strategy for BreakoutStrategy {
    fn signal(&self, window: &BarWindow<'_>) -> Result<Signal> {
        if window.len() < self.min_bars_required() {
            return Err(CoreError::insufficient(
                self.name(),
                self.min_bars_required(),
                window.len(),
            ));
        }

        let history = window.history();
        let channel = &history[history.len() - self.lookback..];
        let upper = channel.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lower = channel.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let close = window.current().close;

        let signal = if close > upper {
            Signal::long()
        } else if close < lower {
            Signal::short()
        } else {
            Signal::flat()
        };
        Ok(signal)
    }

    fn name(&self) -> &str {
        "breakout"
    }

    fn min_bars_required(&self) -> usize {
        self.lookback + 1
    }
}

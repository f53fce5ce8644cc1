use super::Strategy;
use crate::error::CoreError;
use crate::indicators::sma;
use crate::models::{BarWindow, Signal};
use crate::Result;

/// Trend-following moving average crossover
///
/// Long while the fast SMA is above the slow SMA, short while below.
#[derive(Debug, Clone)]
pub struct MaCrossoverStrategy {
    fast_period: usize,
    slow_period: usize,
}

impl MaCrossoverStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Result<Self> {
        if fast_period == 0 || fast_period >= slow_period {
            return Err(CoreError::validation(format!(
                "ma_crossover needs 0 < fast < slow, got fast={} slow={}",
                fast_period, slow_period
            )));
        }
        Ok(Self {
            fast_period,
            slow_period,
        })
    }
}

impl Default for MaCrossoverStrategy {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 30,
        }
    }
}

impl Strategy for MaCrossoverStrategy {
    fn signal(&self, window: &BarWindow<'_>) -> Result<Signal> {
        if window.len() < self.min_bars_required() {
            return Err(CoreError::insufficient(
                self.name(),
                self.min_bars_required(),
                window.len(),
            ));
        }

        let closes = window.closes();
        let fast = sma(&closes, self.fast_period);
        let slow = sma(&closes, self.slow_period);

        let signal = match (fast, slow) {
            (Some(f), Some(s)) if f > s => Signal::long(),
            (Some(f), Some(s)) if f < s => Signal::short(),
            _ => Signal::flat(),
        };
        Ok(signal)
    }

    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn min_bars_required(&self) -> usize {
        self.slow_period
    }
}

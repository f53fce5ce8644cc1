/// Average True Range (ATR) and volatility regime
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// The first bar has no previous close, so its true range is High - Low.
/// ATR is seeded with the simple mean of the first `period` true ranges and
/// then follows Wilder's smoothing.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::Bar;
use crate::Result;

/// True range for every bar
pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let high_low = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev_close) => high_low
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
                None => high_low,
            }
        })
        .collect()
}

/// ATR aligned with `bars`
///
/// The first `period - 1` entries are `None`: not enough history yet.
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }

    let trs = true_ranges(bars);
    let mut atr = trs[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(atr);

    for i in period..trs.len() {
        atr = (atr * (period as f64 - 1.0) + trs[i]) / period as f64;
        out[i] = Some(atr);
    }

    out
}

/// ATR at the last bar
pub fn latest_atr(bars: &[Bar], period: usize) -> Result<f64> {
    if period == 0 {
        return Err(CoreError::validation("ATR period must be positive"));
    }
    if bars.len() < period {
        return Err(CoreError::insufficient(
            format!("ATR({})", period),
            period,
            bars.len(),
        ));
    }

    atr_series(bars, period)
        .last()
        .copied()
        .flatten()
        .ok_or_else(|| CoreError::insufficient(format!("ATR({})", period), period, bars.len()))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

/// Classify the latest ATR against its own trailing distribution
///
/// Returns `None` until `lookback` ATR values exist.
pub fn volatility_regime(
    bars: &[Bar],
    period: usize,
    lookback: usize,
    low_percentile: f64,
    high_percentile: f64,
) -> Option<VolatilityRegime> {
    if lookback == 0 {
        return None;
    }

    let available: Vec<f64> = atr_series(bars, period).into_iter().flatten().collect();
    if available.len() < lookback {
        return None;
    }

    let recent = &available[available.len() - lookback..];
    let current = *recent.last()?;
    let at_or_below = recent.iter().filter(|&&v| v <= current).count();
    let percentile = at_or_below as f64 / recent.len() as f64;

    if percentile >= high_percentile {
        Some(VolatilityRegime::High)
    } else if percentile <= low_percentile {
        Some(VolatilityRegime::Low)
    } else {
        Some(VolatilityRegime::Normal)
    }
}

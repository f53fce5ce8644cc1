use crate::error::CoreError;
use crate::models::Bar;
use crate::Result;

/// Validates OHLC bar data at the input boundary
///
/// Violations are rejected, never corrected.
pub struct BarValidator {
    timeframe_ms: i64,
}

impl BarValidator {
    pub fn new(timeframe_ms: i64) -> Self {
        Self { timeframe_ms }
    }

    /// Validate a single bar for correctness
    pub fn validate(&self, bar: &Bar) -> Result<()> {
        self.validate_prices(bar)?;
        self.validate_ohlc_relationship(bar)?;
        Ok(())
    }

    /// Validate a whole sequence: every bar, then ordering and spacing
    pub fn validate_sequence(&self, bars: &[Bar]) -> Result<()> {
        if self.timeframe_ms <= 0 {
            return Err(CoreError::validation(format!(
                "timeframe must be positive, got {}ms",
                self.timeframe_ms
            )));
        }

        for (i, bar) in bars.iter().enumerate() {
            self.validate(bar)
                .map_err(|e| CoreError::validation(format!("bar {}: {}", i, e)))?;
        }

        for (i, pair) in bars.windows(2).enumerate() {
            let delta = pair[1].timestamp - pair[0].timestamp;
            if delta <= 0 {
                return Err(CoreError::validation(format!(
                    "bars not strictly increasing at index {}: {} -> {}",
                    i + 1,
                    pair[0].timestamp,
                    pair[1].timestamp
                )));
            }
            // Gaps are tolerated, but only in whole timeframes
            if delta % self.timeframe_ms != 0 {
                return Err(CoreError::validation(format!(
                    "bar spacing {}ms at index {} is not a multiple of timeframe {}ms",
                    delta,
                    i + 1,
                    self.timeframe_ms
                )));
            }
        }

        Ok(())
    }

    fn validate_prices(&self, bar: &Bar) -> Result<()> {
        for (name, value) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CoreError::validation(format!(
                    "invalid {} price: {}",
                    name, value
                )));
            }
        }
        // Volume can be 0.0
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(CoreError::validation(format!(
                "invalid volume: {}",
                bar.volume
            )));
        }
        Ok(())
    }

    /// low <= min(open, close) <= max(open, close) <= high
    fn validate_ohlc_relationship(&self, bar: &Bar) -> Result<()> {
        if bar.high < bar.low {
            return Err(CoreError::validation(format!(
                "high ({}) is less than low ({})",
                bar.high, bar.low
            )));
        }
        if bar.high < bar.open.max(bar.close) {
            return Err(CoreError::validation(format!(
                "high ({}) is below open/close ({}/{})",
                bar.high, bar.open, bar.close
            )));
        }
        if bar.low > bar.open.min(bar.close) {
            return Err(CoreError::validation(format!(
                "low ({}) is above open/close ({}/{})",
                bar.low, bar.open, bar.close
            )));
        }
        Ok(())
    }
}

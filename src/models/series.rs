use crate::error::CoreError;
use crate::models::{Bar, BarValidator};
use crate::Result;

/// Validated, ordered bar sequence for one symbol and timeframe
#[derive(Debug, Clone)]
pub struct BarSeries {
    bars: Vec<Bar>,
    timeframe_ms: i64,
}

impl BarSeries {
    /// Validate and wrap a bar sequence
    ///
    /// Rejects non-positive prices, inconsistent OHLC, non-increasing
    /// timestamps and spacing that is not a whole number of timeframes.
    pub fn new(bars: Vec<Bar>, timeframe_ms: i64) -> Result<Self> {
        BarValidator::new(timeframe_ms).validate_sequence(&bars)?;
        Ok(Self { bars, timeframe_ms })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn timeframe_ms(&self) -> i64 {
        self.timeframe_ms
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Read-only view of bars `0..=t`
    pub fn window(&self, t: usize) -> Result<BarWindow<'_>> {
        if t >= self.bars.len() {
            return Err(CoreError::validation(format!(
                "window index {} out of range for {} bars",
                t,
                self.bars.len()
            )));
        }
        Ok(BarWindow {
            bars: &self.bars[..=t],
        })
    }

    /// View ending at the last bar
    pub fn latest(&self) -> Result<BarWindow<'_>> {
        match self.bars.len() {
            0 => Err(CoreError::insufficient("latest window", 1, 0)),
            n => self.window(n - 1),
        }
    }
}

/// What the simulated present is allowed to see: bars up to and including `t`
///
/// There is no way to reach a bar after `t` through this type, so anything
/// that only takes a `BarWindow` cannot look ahead.
#[derive(Debug, Clone, Copy)]
pub struct BarWindow<'a> {
    bars: &'a [Bar],
}

impl<'a> BarWindow<'a> {
    /// Build a view from an already validated, non-empty slice
    pub fn from_slice(bars: &'a [Bar]) -> Result<Self> {
        if bars.is_empty() {
            return Err(CoreError::insufficient("bar window", 1, 0));
        }
        Ok(Self { bars })
    }

    /// Index of the current bar within its series
    pub fn index(&self) -> usize {
        self.bars.len() - 1
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &'a [Bar] {
        self.bars
    }

    /// The current bar
    pub fn current(&self) -> &'a Bar {
        &self.bars[self.bars.len() - 1]
    }

    /// Bars strictly before the current one
    pub fn history(&self) -> &'a [Bar] {
        &self.bars[..self.bars.len() - 1]
    }

    /// Last `n` bars including the current one (fewer if not available)
    pub fn tail(&self, n: usize) -> &'a [Bar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                Bar::new(i as i64 * 60_000, p, p + 1.0, p - 1.0, p + 0.5, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_series_rejects_invalid_bar() {
        let mut bars = create_test_bars(5);
        bars[3].high = bars[3].low - 1.0;

        let result = BarSeries::new(bars, 60_000);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("bar 3"));
    }

    #[test]
    fn test_window_hides_future_bars() {
        let series = BarSeries::new(create_test_bars(10), 60_000).unwrap();
        let window = series.window(4).unwrap();

        assert_eq!(window.len(), 5);
        assert_eq!(window.index(), 4);
        assert_eq!(window.current().timestamp, 4 * 60_000);
        assert_eq!(window.history().len(), 4);
        assert_eq!(window.tail(2).len(), 2);
        assert_eq!(window.tail(50).len(), 5);
    }

    #[test]
    fn test_window_out_of_range() {
        let series = BarSeries::new(create_test_bars(3), 60_000).unwrap();
        assert!(series.window(3).is_err());
        assert_eq!(series.latest().unwrap().index(), 2);
    }

    #[test]
    fn test_empty_series_has_no_latest() {
        let series = BarSeries::new(vec![], 60_000).unwrap();
        assert!(series.latest().unwrap_err().is_data_insufficiency());
    }
}

pub mod series;
pub mod validator;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Result;

pub use series::{BarSeries, BarWindow};
pub use validator::BarValidator;

/// OHLCV bar, timestamp is the bar open in epoch milliseconds (UTC)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// (H + L + C) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Direction of a position or plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn from_signal(value: i8) -> Option<Self> {
        match value.signum() {
            1 => Some(Side::Long),
            -1 => Some(Side::Short),
            _ => None,
        }
    }

    /// +1.0 for long, -1.0 for short
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_signal(&self) -> i8 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Per-bar output of one strategy: -1, 0 or +1 with an optional strength in [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    value: i8,
    strength: Option<f64>,
}

impl Signal {
    pub fn new(value: i8, strength: Option<f64>) -> Result<Self> {
        if !(-1..=1).contains(&value) {
            return Err(CoreError::validation(format!(
                "signal value must be -1, 0 or 1, got {}",
                value
            )));
        }
        if let Some(s) = strength {
            if !s.is_finite() || !(0.0..=1.0).contains(&s) {
                return Err(CoreError::validation(format!(
                    "signal strength must be within [0, 1], got {}",
                    s
                )));
            }
        }
        Ok(Self { value, strength })
    }

    pub fn long() -> Self {
        Self {
            value: 1,
            strength: None,
        }
    }

    pub fn short() -> Self {
        Self {
            value: -1,
            strength: None,
        }
    }

    pub fn flat() -> Self {
        Self {
            value: 0,
            strength: None,
        }
    }

    pub fn value(&self) -> i8 {
        self.value
    }

    pub fn strength(&self) -> Option<f64> {
        self.strength
    }

    /// Value scaled by strength (strength defaults to 1)
    pub fn weighted_value(&self) -> f64 {
        self.value as f64 * self.strength.unwrap_or(1.0)
    }

    pub fn side(&self) -> Option<Side> {
        Side::from_signal(self.value)
    }
}

/// Entry window a decision was evaluated in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Window {
    A,
    B,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::A => write!(f, "A"),
            Window::B => write!(f, "B"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_rejects_out_of_range_value() {
        assert!(Signal::new(2, None).is_err());
        assert!(Signal::new(-1, Some(0.5)).is_ok());
    }

    #[test]
    fn test_signal_rejects_bad_strength() {
        let result = Signal::new(1, Some(1.5));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("strength"));
        assert!(Signal::new(1, Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_weighted_value() {
        let signal = Signal::new(-1, Some(0.25)).unwrap();
        assert_eq!(signal.weighted_value(), -0.25);
        assert_eq!(Signal::long().weighted_value(), 1.0);
        assert_eq!(Signal::flat().side(), None);
    }

    #[test]
    fn test_side_from_signal() {
        assert_eq!(Side::from_signal(1), Some(Side::Long));
        assert_eq!(Side::from_signal(-1), Some(Side::Short));
        assert_eq!(Side::from_signal(0), None);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn test_typical_price() {
        let bar = Bar::new(0, 100.0, 110.0, 90.0, 105.0, 1.0);
        assert!((bar.typical_price() - 101.666_666).abs() < 1e-4);
    }
}

// Technical indicators: volatility (ATR, regime), session VWAP, SMA/RSI

pub mod atr;
pub mod trend;
pub mod vwap;

pub use atr::{atr_series, latest_atr, true_ranges, volatility_regime, VolatilityRegime};
pub use trend::{rsi, sma};
pub use vwap::session_vwap;

// Risk management module
pub mod circuit_breakers;
pub mod sizing;

pub use circuit_breakers::{CircuitBreakerTrip, CircuitBreakers, TradingState};
pub use sizing::{KellyConfig, KellySizer, PositionSize, PositionSizer, SizingConfig, MAX_RISK_PCT};

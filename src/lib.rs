// Core modules
pub mod backtest;
pub mod calendar;
pub mod combiner;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod models;
pub mod planning;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use combiner::{CombinedSignal, SignalCombiner};
pub use config::AppConfig;
pub use engine::{DailyDecision, DecisionContext, DecisionEngine, DecisionState};
pub use error::CoreError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, CoreError>;

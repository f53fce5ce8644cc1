//! Application configuration.
//!
//! Every section has working defaults. A TOML file and `SESSIONBOT__*`
//! environment variables override them, in that order, e.g.
//! `SESSIONBOT__SIZING__RISK_PCT=0.02`.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::backtest::BacktestConfig;
use crate::calendar::{CalendarConfig, TradingCalendar};
use crate::combiner::CombinerConfig;
use crate::engine::EngineConfig;
use crate::planning::{EntryConfig, StopConfig};
use crate::risk::SizingConfig;
use crate::strategy::{build_strategies, StrategyConfig};
use crate::Result;

pub const ENV_PREFIX: &str = "SESSIONBOT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub calendar: CalendarConfig,
    pub combiner: CombinerConfig,
    pub entry: EntryConfig,
    pub stops: StopConfig,
    pub sizing: SizingConfig,
    pub backtest: BacktestConfig,
    pub strategies: Vec<StrategyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            calendar: CalendarConfig::default(),
            combiner: CombinerConfig::default(),
            entry: EntryConfig::default(),
            stops: StopConfig::default(),
            sizing: SizingConfig::default(),
            backtest: BacktestConfig::default(),
            strategies: vec![
                StrategyConfig::new("ma_crossover"),
                StrategyConfig::new("rsi_reversion"),
                StrategyConfig::new("breakout"),
            ],
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!(strategies = config.strategies.len(), "Configuration loaded");
        Ok(config)
    }

    /// First violation wins
    pub fn validate(&self) -> Result<()> {
        TradingCalendar::from_config(&self.calendar)?;
        if self.calendar.min_minutes_before_close < 0 {
            return Err(crate::CoreError::validation(
                "min_minutes_before_close must not be negative",
            ));
        }
        self.combiner.validate()?;
        self.entry.validate()?;
        self.stops.validate()?;
        self.sizing.validate()?;
        self.backtest.validate()?;
        build_strategies(&self.strategies)?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            calendar: self.calendar.clone(),
            entry: self.entry.clone(),
            stops: self.stops.clone(),
            sizing: self.sizing.clone(),
        }
    }
}

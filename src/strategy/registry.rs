use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{BreakoutStrategy, MaCrossoverStrategy, RsiReversionStrategy, Strategy};
use crate::error::CoreError;
use crate::Result;

/// Named strategy with numeric parameters, as it appears in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    /// Key in the signal set; defaults to `name`
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl StrategyConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn key(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }

    fn param_usize(&self, key: &str, default: usize) -> usize {
        self.params
            .get(key)
            .copied()
            .map(|v| v.max(0.0) as usize)
            .unwrap_or(default)
    }
}

/// Closed set of built-in strategies, resolved by name at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    MaCrossover,
    RsiReversion,
    Breakout,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::MaCrossover,
        StrategyKind::RsiReversion,
        StrategyKind::Breakout,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "ma_crossover" => Ok(Self::MaCrossover),
            "rsi_reversion" => Ok(Self::RsiReversion),
            "breakout" => Ok(Self::Breakout),
            _ => Err(CoreError::UnknownStrategy(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MaCrossover => "ma_crossover",
            Self::RsiReversion => "rsi_reversion",
            Self::Breakout => "breakout",
        }
    }

    pub fn build(&self, config: &StrategyConfig) -> Result<Box<dyn Strategy>> {
        let strategy: Box<dyn Strategy> = match self {
            Self::MaCrossover => Box::new(MaCrossoverStrategy::new(
                config.param_usize("fast_period", 10),
                config.param_usize("slow_period", 30),
            )?),
            Self::RsiReversion => Box::new(RsiReversionStrategy::new(
                config.param_usize("period", 14),
                config.param("oversold", 30.0),
                config.param("overbought", 70.0),
            )?),
            Self::Breakout => Box::new(BreakoutStrategy::new(config.param_usize("lookback", 20))?),
        };
        Ok(strategy)
    }
}

/// Build every configured strategy, keyed by label
///
/// Fails on the first unknown name, invalid parameter set or duplicate key.
pub fn build_strategies(configs: &[StrategyConfig]) -> Result<Vec<(String, Box<dyn Strategy>)>> {
    if configs.is_empty() {
        return Err(CoreError::validation("at least one strategy is required"));
    }

    let mut built: Vec<(String, Box<dyn Strategy>)> = Vec::with_capacity(configs.len());
    for config in configs {
        let key = config.key().to_string();
        if built.iter().any(|(k, _)| *k == key) {
            return Err(CoreError::validation(format!("duplicate strategy key: {}", key)));
        }
        let strategy = StrategyKind::from_name(&config.name)?.build(config)?;
        built.push((key, strategy));
    }

    tracing::debug!("Built {} strategies", built.len());
    Ok(built)
}

//! Consensus over several strategy signals.
//!
//! Every policy reduces the signals visible at bar `t` to one direction in
//! {-1, 0, +1} plus a confidence in [0, 1]. Strategies still warming up are
//! left out of the vote. A tie (non-empty vote whose long and short mass
//! balance exactly) is resolved by the explicitly configured `TieBreak`.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::{BarWindow, Signal};
use crate::strategy::SignalView;
use crate::Result;

const TIE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CombineMethod {
    SimpleAverage,
    WeightedAverage,
    PerformanceWeighted,
    MajorityVote,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    Flat,
    HoldPrevious,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CombinerConfig {
    pub method: CombineMethod,
    /// |score| must exceed this for the averaging methods to pick a side
    pub threshold: f64,
    /// Minimum agreement fraction for majority vote
    pub min_agreement: f64,
    pub tie_break: TieBreak,
    /// Caller weights for `weighted_average`; keys must match the signal set
    pub weights: BTreeMap<String, f64>,
    /// Trailing bars of realized strategy return for `performance_weighted`
    pub performance_lookback: usize,
    pub min_performance_weight: f64,
    /// Seed for random tie-breaking
    pub seed: u64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            method: CombineMethod::SimpleAverage,
            threshold: 0.3,
            min_agreement: 0.6,
            tie_break: TieBreak::Flat,
            weights: BTreeMap::new(),
            performance_lookback: 20,
            min_performance_weight: 1e-4,
            seed: 42,
        }
    }
}

impl CombinerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(CoreError::validation(format!(
                "combiner threshold must be within [0, 1), got {}",
                self.threshold
            )));
        }
        if !(self.min_agreement > 0.0 && self.min_agreement <= 1.0) {
            return Err(CoreError::validation(format!(
                "min_agreement must be within (0, 1], got {}",
                self.min_agreement
            )));
        }
        if self.performance_lookback == 0 {
            return Err(CoreError::validation("performance_lookback must be positive"));
        }
        if !(self.min_performance_weight > 0.0) {
            return Err(CoreError::validation("min_performance_weight must be positive"));
        }
        if let Some((k, w)) = self.weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(CoreError::validation(format!(
                "weight for '{}' must be a non-negative number, got {}",
                k, w
            )));
        }
        if self.method == CombineMethod::WeightedAverage && self.weights.values().sum::<f64>() <= 0.0 {
            return Err(CoreError::validation(
                "weighted_average needs weights with a positive sum",
            ));
        }
        Ok(())
    }
}

/// Consensus at one bar; recomputed every bar, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombinedSignal {
    pub signal: i8,
    pub confidence: f64,
    pub weights: BTreeMap<String, f64>,
    pub method: CombineMethod,
    /// Direction came from the tie-break policy
    pub tie_resolved: bool,
}

impl CombinedSignal {
    pub fn flat(method: CombineMethod) -> Self {
        Self {
            signal: 0,
            confidence: 0.0,
            weights: BTreeMap::new(),
            method,
            tie_resolved: false,
        }
    }
}

pub struct SignalCombiner {
    config: CombinerConfig,
    previous: i8,
    rng: StdRng,
}

impl SignalCombiner {
    pub fn new(config: CombinerConfig) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            previous: 0,
            rng,
        })
    }

    pub fn config(&self) -> &CombinerConfig {
        &self.config
    }

    /// Forget the previous output and reseed, for a fresh run
    pub fn reset(&mut self) {
        self.previous = 0;
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }

    /// Combine the signals visible at the window's current bar
    pub fn combine(&mut self, signals: &SignalView<'_>, window: &BarWindow<'_>) -> Result<CombinedSignal> {
        if signals.index() != window.index() {
            return Err(CoreError::validation(format!(
                "signal index {} does not match bar index {}",
                signals.index(),
                window.index()
            )));
        }
        if signals.is_empty() {
            return Err(CoreError::validation("signal set is empty"));
        }
        if self.config.method == CombineMethod::WeightedAverage {
            self.check_weight_keys(signals)?;
        }

        let available: Vec<(&str, Signal)> = signals
            .current()
            .filter_map(|(k, s)| s.map(|s| (k, s)))
            .collect();

        if available.is_empty() {
            self.previous = 0;
            return Ok(CombinedSignal::flat(self.config.method));
        }

        let (raw, confidence, weights, tie) = match self.config.method {
            CombineMethod::MajorityVote => self.majority(&available),
            method => {
                let weights = match method {
                    CombineMethod::WeightedAverage => self.caller_weights(&available),
                    CombineMethod::PerformanceWeighted => self.performance_weights(&available, signals, window),
                    _ => equal_weights(&available),
                };
                self.average(&available, weights)
            }
        };

        let signal = if tie { self.resolve_tie() } else { raw };
        self.previous = signal;

        tracing::trace!(
            index = window.index(),
            signal,
            confidence,
            tie,
            "combined signal"
        );

        Ok(CombinedSignal {
            signal,
            confidence: confidence.clamp(0.0, 1.0),
            weights,
            method: self.config.method,
            tie_resolved: tie,
        })
    }

    fn check_weight_keys(&self, signals: &SignalView<'_>) -> Result<()> {
        let expected: BTreeSet<&str> = signals.keys().collect();
        let given: BTreeSet<&str> = self.config.weights.keys().map(|k| k.as_str()).collect();
        if expected != given {
            let missing: Vec<_> = expected.difference(&given).collect();
            let extra: Vec<_> = given.difference(&expected).collect();
            return Err(CoreError::validation(format!(
                "weight keys do not match signals (missing: {:?}, unexpected: {:?})",
                missing, extra
            )));
        }
        Ok(())
    }

    fn caller_weights(&self, available: &[(&str, Signal)]) -> BTreeMap<String, f64> {
        let raw: Vec<(&str, f64)> = available
            .iter()
            .map(|(k, _)| (*k, self.config.weights.get(*k).copied().unwrap_or(0.0)))
            .collect();
        normalize(&raw)
    }

    /// Weight ∝ trailing realized return of each strategy, `signal[j-1] × return[j]`
    fn performance_weights(
        &self,
        available: &[(&str, Signal)],
        signals: &SignalView<'_>,
        window: &BarWindow<'_>,
    ) -> BTreeMap<String, f64> {
        let bars = window.bars();
        let t = window.index();
        let start = (t + 1).saturating_sub(self.config.performance_lookback).max(1);
        let floor = self.config.min_performance_weight;

        let raw: Vec<(&str, f64)> = available
            .iter()
            .map(|(key, _)| {
                let realized: f64 = (start..=t)
                    .map(|j| {
                        let ret = bars[j].close / bars[j - 1].close - 1.0;
                        let held = signals.at(key, j - 1).map(|s| s.weighted_value()).unwrap_or(0.0);
                        held * ret
                    })
                    .sum();
                (*key, realized.max(floor))
            })
            .collect();
        normalize(&raw)
    }

    fn average(
        &self,
        available: &[(&str, Signal)],
        weights: BTreeMap<String, f64>,
    ) -> (i8, f64, BTreeMap<String, f64>, bool) {
        if weights.is_empty() {
            return (0, 0.0, weights, false);
        }

        let score: f64 = available
            .iter()
            .map(|(k, s)| weights.get(*k).copied().unwrap_or(0.0) * s.weighted_value())
            .sum();
        let any_vote = available.iter().any(|(_, s)| s.value() != 0);

        let (signal, tie) = if score > self.config.threshold {
            (1, false)
        } else if score < -self.config.threshold {
            (-1, false)
        } else if any_vote && score.abs() < TIE_EPSILON {
            (0, true)
        } else {
            (0, false)
        };

        // Simple average reports |mean| / N over the available strategies
        let confidence = match self.config.method {
            CombineMethod::SimpleAverage => score.abs() / available.len() as f64,
            _ => score.abs(),
        };

        (signal, confidence, weights, tie)
    }

    fn majority(&self, available: &[(&str, Signal)]) -> (i8, f64, BTreeMap<String, f64>, bool) {
        let n = available.len() as f64;
        let longs = available.iter().filter(|(_, s)| s.value() > 0).count();
        let shorts = available.iter().filter(|(_, s)| s.value() < 0).count();
        let agreement = longs.max(shorts) as f64 / n;
        let weights = equal_weights(available);

        if longs == shorts && longs > 0 {
            return (0, agreement, weights, true);
        }
        if longs + shorts == 0 || agreement < self.config.min_agreement {
            return (0, agreement, weights, false);
        }

        let signal = if longs > shorts { 1 } else { -1 };
        (signal, agreement, weights, false)
    }

    fn resolve_tie(&mut self) -> i8 {
        match self.config.tie_break {
            TieBreak::Flat => 0,
            TieBreak::HoldPrevious => self.previous,
            TieBreak::Random => {
                if self.rng.gen_bool(0.5) {
                    1
                } else {
                    -1
                }
            }
        }
    }
}

fn equal_weights(available: &[(&str, Signal)]) -> BTreeMap<String, f64> {
    let w = 1.0 / available.len() as f64;
    available.iter().map(|(k, _)| (k.to_string(), w)).collect()
}

fn normalize(raw: &[(&str, f64)]) -> BTreeMap<String, f64> {
    let total: f64 = raw.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    raw.iter().map(|(k, w)| (k.to_string(), w / total)).collect()
}

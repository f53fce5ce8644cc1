use std::collections::BTreeMap;

use super::Strategy;
use crate::error::CoreError;
use crate::models::{BarSeries, Signal};
use crate::Result;

/// Named per-bar signal series, index-aligned with a bar series
///
/// `None` marks a bar where the producer had not warmed up yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSet {
    series: BTreeMap<String, Vec<Option<Signal>>>,
    len: usize,
}

impl SignalSet {
    pub fn new(series: BTreeMap<String, Vec<Option<Signal>>>) -> Result<Self> {
        let mut lengths = series.values().map(|s| s.len());
        let len = lengths
            .next()
            .ok_or_else(|| CoreError::validation("signal set is empty"))?;

        if let Some((key, other)) = series.iter().find(|(_, s)| s.len() != len) {
            return Err(CoreError::validation(format!(
                "signal series '{}' has {} entries, expected {}",
                key,
                other.len(),
                len
            )));
        }

        Ok(Self { series, len })
    }

    /// Run every strategy over every bar of the series
    pub fn from_strategies(
        strategies: &[(String, Box<dyn Strategy>)],
        bars: &BarSeries,
    ) -> Result<Self> {
        let mut series = BTreeMap::new();

        for (key, strategy) in strategies {
            let mut values = Vec::with_capacity(bars.len());
            for t in 0..bars.len() {
                let window = bars.window(t)?;
                match strategy.signal(&window) {
                    Ok(signal) => values.push(Some(signal)),
                    Err(e) if e.is_data_insufficiency() => values.push(None),
                    Err(e) => return Err(e),
                }
            }
            series.insert(key.clone(), values);
        }

        Self::new(series)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|k| k.as_str())
    }

    pub fn strategy_count(&self) -> usize {
        self.series.len()
    }

    /// Signals visible at bar `t`: indices `0..=t` only
    pub fn view(&self, t: usize) -> Result<SignalView<'_>> {
        if t >= self.len {
            return Err(CoreError::validation(format!(
                "signal index {} out of range for {} bars",
                t, self.len
            )));
        }

        Ok(SignalView {
            series: self
                .series
                .iter()
                .map(|(k, v)| (k.as_str(), &v[..=t]))
                .collect(),
            index: t,
        })
    }
}

/// Read-only, lookahead-free slice of a `SignalSet`, ordered by key
#[derive(Debug, Clone)]
pub struct SignalView<'a> {
    series: Vec<(&'a str, &'a [Option<Signal>])>,
    index: usize,
}

impl<'a> SignalView<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.series.iter().map(|(k, _)| *k)
    }

    /// Signal of every strategy at the current bar
    pub fn current(&self) -> impl Iterator<Item = (&'a str, Option<Signal>)> + '_ {
        self.series.iter().map(|(k, v)| (*k, v[v.len() - 1]))
    }

    /// Signal of one strategy at an earlier (or the current) bar
    pub fn at(&self, key: &str, k: usize) -> Option<Signal> {
        self.series
            .iter()
            .find(|(name, _)| *name == key)
            .and_then(|(_, v)| v.get(k).copied().flatten())
    }
}

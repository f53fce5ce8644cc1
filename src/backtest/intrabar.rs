//! Intrabar ambiguity: which protective level fills first when one bar
//! touches both the stop and the target.

use serde::{Deserialize, Serialize};

use super::position::ExitReason;
use crate::models::{Bar, Side};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    /// Stop first: the conservative assumption
    #[default]
    WorstCase,
    /// Target first
    BestCase,
    /// Level closer to the bar open is touched first, stop on equal distance
    OpenProximity,
}

impl IntrabarPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorstCase => "worst_case",
            Self::BestCase => "best_case",
            Self::OpenProximity => "open_proximity",
        }
    }

    /// Exit triggered by `bar` for a position with these levels, with its fill price
    ///
    /// A bar opening beyond the stop fills at the open. A bar opening beyond
    /// the target fills at the target.
    pub fn resolve(&self, side: Side, stop: f64, target: f64, bar: &Bar) -> Option<(ExitReason, f64)> {
        let (stop_hit, target_hit, gapped_stop, gapped_target) = match side {
            Side::Long => (
                bar.low <= stop,
                bar.high >= target,
                bar.open <= stop,
                bar.open >= target,
            ),
            Side::Short => (
                bar.high >= stop,
                bar.low <= target,
                bar.open >= stop,
                bar.open <= target,
            ),
        };

        if gapped_stop {
            return Some((ExitReason::StopLoss, bar.open));
        }
        if gapped_target {
            return Some((ExitReason::TakeProfit, target));
        }

        let stop_first = match (stop_hit, target_hit) {
            (false, false) => return None,
            (true, false) => true,
            (false, true) => false,
            (true, true) => match self {
                Self::WorstCase => true,
                Self::BestCase => false,
                Self::OpenProximity => (bar.open - stop).abs() <= (bar.open - target).abs(),
            },
        };

        if stop_first {
            Some((ExitReason::StopLoss, stop))
        } else {
            Some((ExitReason::TakeProfit, target))
        }
    }
}

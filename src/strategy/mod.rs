// Strategy signal producers and their name registry
pub mod breakout;
pub mod ma_crossover;
pub mod registry;
pub mod rsi_reversion;
pub mod signal_set;

use crate::models::{BarWindow, Signal};
use crate::Result;

pub use breakout::BreakoutStrategy;
pub use ma_crossover::MaCrossoverStrategy;
pub use registry::{build_strategies, StrategyConfig, StrategyKind};
pub use rsi_reversion::RsiReversionStrategy;
pub use signal_set::{SignalSet, SignalView};

/// Base trait for all signal producers
///
/// A strategy sees only the bars up to and including the current one.
pub trait Strategy: Send + Sync {
    /// Signal for the current (last) bar of the window
    ///
    /// Returns a data-insufficiency error while the window is shorter
    /// than `min_bars_required`.
    fn signal(&self, window: &BarWindow<'_>) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum bars required before a signal exists
    fn min_bars_required(&self) -> usize;
}

// Trade planning: entry price, protective levels
pub mod entry;
pub mod stops;

pub use entry::{EntryBandCalculator, EntryConfig, EntryPlan, MidSource};
pub use stops::{RegimeAdjustment, StopConfig, StopMethod, StopTargetCalculator, StopTargetPlan};

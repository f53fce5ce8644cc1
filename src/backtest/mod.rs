// Bar-by-bar replay of the decision pipeline
pub mod intrabar;
pub mod metrics;
pub mod position;
pub mod simulator;
pub mod synthetic;

pub use intrabar::IntrabarPolicy;
pub use metrics::BacktestMetrics;
pub use position::{BacktestTrade, ExitReason, OpenPosition};
pub use simulator::{BacktestConfig, BacktestReport, BacktestSimulator, EquityPoint};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};

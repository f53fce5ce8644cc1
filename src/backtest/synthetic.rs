use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::models::Bar;

/// 2024-01-02 00:00:00 UTC, a Tuesday
const DEFAULT_START_MS: i64 = 1_704_153_600_000;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±2% per bar)
    Volatile,
    /// Contains time gaps (missing bars)
    WithGaps,
    /// Rapid drawdown to test circuit breakers
    DrawdownTest,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 6] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::Volatile,
        MarketScenario::WithGaps,
        MarketScenario::DrawdownTest,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "uptrend" => Some(Self::Uptrend),
            "downtrend" => Some(Self::Downtrend),
            "sideways" => Some(Self::Sideways),
            "volatile" => Some(Self::Volatile),
            "with_gaps" | "gaps" => Some(Self::WithGaps),
            "drawdown" | "drawdown_test" => Some(Self::DrawdownTest),
            _ => None,
        }
    }
}

/// Generates valid, reproducible bars for demos and tests
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start_ms: i64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000_000.0,
            start_ms: DEFAULT_START_MS,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_start(mut self, start_ms: i64) -> Self {
        self.start_ms = start_ms;
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Generate `num_bars` bars spaced `interval_minutes` apart
    ///
    /// `WithGaps` drops every 50th slot, so it returns fewer bars.
    pub fn generate(&mut self, scenario: MarketScenario, num_bars: usize, interval_minutes: i64) -> Vec<Bar> {
        let interval_ms = interval_minutes * 60_000;
        let per_day = 24.0 * 60.0 / interval_minutes as f64;
        let mut bars = Vec::with_capacity(num_bars);
        let mut price = self.base_price;

        for i in 0..num_bars {
            if scenario == MarketScenario::WithGaps && i % 50 == 49 {
                continue;
            }

            price = match scenario {
                MarketScenario::Uptrend => price * (1.0 + 0.02 / per_day + self.rng.gen_range(-0.001..0.001)),
                MarketScenario::Downtrend => price * (1.0 - 0.02 / per_day + self.rng.gen_range(-0.001..0.001)),
                MarketScenario::Sideways => {
                    // 10% pull back to the mean plus noise
                    let reversion = (self.base_price - price) * 0.1;
                    price + reversion + price * self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => {
                    let next = price * (1.0 + self.rng.gen_range(-0.02..0.02));
                    next.max(self.base_price * 0.5)
                }
                MarketScenario::WithGaps => price * (1.0 + self.rng.gen_range(-0.01..0.01)),
                MarketScenario::DrawdownTest => {
                    if i < num_bars / 2 {
                        price * (1.0 + self.rng.gen_range(-0.005..0.01))
                    } else {
                        // -25% over the second half
                        let drop_rate = -0.25 / (num_bars as f64 / 2.0);
                        price * (1.0 + drop_rate + self.rng.gen_range(-0.005..0.005))
                    }
                }
            };

            let timestamp = self.start_ms + i as i64 * interval_ms;
            bars.push(self.create_bar(price, timestamp));
        }

        bars
    }

    /// OHLC around a close, always internally consistent
    fn create_bar(&mut self, close: f64, timestamp: i64) -> Bar {
        let noise_pct = 0.002; // ±0.2% intrabar movement

        let open = close * (1.0 + self.rng.gen_range(-noise_pct..noise_pct));
        let high = close.max(open) * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = close.min(open) * (1.0 - self.rng.gen_range(0.0..noise_pct));

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Bar::new(timestamp, open, high, low, close, volume)
    }
}

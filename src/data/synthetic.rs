use crate::models::{Candle, Timeframe};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Sideways/choppy market around the starting price
    Sideways,
    /// High volatility with large swings
    Volatile,
}

/// Generates synthetic index candles for demo runs and tests
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_volume: 100_000.0,
        }
    }

    /// Generate `num_candles` consecutive candles starting at `start`
    pub fn generate(
        &mut self,
        instrument: &str,
        scenario: MarketScenario,
        start: DateTime<Utc>,
        start_price: f64,
        num_candles: usize,
        timeframe: Timeframe,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut price = start_price;

        for i in 0..num_candles {
            let timestamp = start + timeframe.duration() * i as i32;
            let close = self.step_price(scenario, price, start_price);
            candles.push(self.create_candle(instrument, price, close, timestamp));
            price = close;
        }

        candles
    }

    /// Next close for `scenario` given the previous close
    pub fn step_price(&mut self, scenario: MarketScenario, price: f64, anchor: f64) -> f64 {
        let next = match scenario {
            MarketScenario::Uptrend => {
                // Drift + reduced noise so trend is dominant
                price * (1.0 + 0.0008 + self.rng.gen_range(-0.001..0.001))
            }
            MarketScenario::Downtrend => {
                price * (1.0 - 0.0008 + self.rng.gen_range(-0.001..0.001))
            }
            MarketScenario::Sideways => {
                // Mean reversion force + noise
                let reversion = (anchor - price) * 0.1;
                price + reversion + price * self.rng.gen_range(-0.002..0.002)
            }
            MarketScenario::Volatile => price * (1.0 + self.rng.gen_range(-0.01..0.01)),
        };

        // Prevent price from collapsing
        next.max(anchor * 0.5)
    }

    /// Helper to create a candle that opens at the previous close
    fn create_candle(
        &mut self,
        instrument: &str,
        open: f64,
        close: f64,
        timestamp: DateTime<Utc>,
    ) -> Candle {
        // ±0.1% intrabar excursion beyond the body
        let noise_pct = 0.001;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..noise_pct));

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            instrument: instrument.to_string(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Open time of the bar of `timeframe` containing `now`
pub fn bar_open(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let secs = timeframe.duration().num_seconds();
    let offset = now.timestamp().rem_euclid(secs);
    now - Duration::seconds(offset) - Duration::nanoseconds(now.timestamp_subsec_nanos() as i64)
}

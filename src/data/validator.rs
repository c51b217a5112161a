use crate::models::Candle;
use crate::EngineError;
use chrono::{DateTime, Utc};
use tracing::warn;

/// Validates OHLC candle data for sanity and correctness
pub struct CandleValidator {
    /// Close-to-close move (percent) above which a candle is counted as an outlier
    outlier_move_pct: f64,
}

/// Outcome of validating a batch of candles
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub dropped: Vec<EngineError>,
    pub outliers: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }
}

impl CandleValidator {
    pub fn new() -> Self {
        Self {
            outlier_move_pct: 5.0,
        }
    }

    pub fn with_outlier_threshold(outlier_move_pct: f64) -> Self {
        Self { outlier_move_pct }
    }

    /// Validate a single candle for correctness
    pub fn validate(&self, candle: &Candle) -> Result<(), String> {
        self.validate_prices(candle)?;
        self.validate_ohlc_relationship(candle)?;
        Ok(())
    }

    /// Validate an ordered batch, dropping every candle that fails.
    ///
    /// A candle whose timestamp is not strictly after the last accepted one
    /// is dropped as well, which also removes duplicates.
    pub fn validate_batch(&self, candles: Vec<Candle>) -> (Vec<Candle>, ValidationReport) {
        let mut report = ValidationReport::default();
        let mut accepted: Vec<Candle> = Vec::with_capacity(candles.len());
        let mut last_ts: Option<DateTime<Utc>> = None;

        for (index, candle) in candles.into_iter().enumerate() {
            let result = self.validate(&candle).and_then(|_| match last_ts {
                Some(prev) if candle.timestamp <= prev => Err(format!(
                    "timestamp {} is not after previous candle {}",
                    candle.timestamp, prev
                )),
                _ => Ok(()),
            });

            if let Err(reason) = result {
                warn!(
                    "Dropping candle {} #{}: {}",
                    candle.instrument, index, reason
                );
                report.dropped.push(EngineError::InvalidCandle { index, reason });
                continue;
            }

            if let Some(prev) = accepted.last() {
                let move_pct = (candle.close - prev.close).abs() / prev.close * 100.0;
                if move_pct > self.outlier_move_pct {
                    report.outliers += 1;
                }
            }

            last_ts = Some(candle.timestamp);
            accepted.push(candle);
        }

        (accepted, report)
    }

    /// Validate that all prices are positive and finite
    fn validate_prices(&self, candle: &Candle) -> Result<(), String> {
        for (name, value) in [
            ("open", candle.open),
            ("high", candle.high),
            ("low", candle.low),
            ("close", candle.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("Invalid {} price: {}", name, value));
            }
        }
        // An empty bar would drag the trailing volume average down
        if !candle.volume.is_finite() || candle.volume <= 0.0 {
            return Err(format!("Invalid volume: {}", candle.volume));
        }
        Ok(())
    }

    /// Validate OHLC relationships (high >= low, etc.)
    fn validate_ohlc_relationship(&self, candle: &Candle) -> Result<(), String> {
        if candle.high < candle.low {
            return Err(format!(
                "High ({}) is less than low ({})",
                candle.high, candle.low
            ));
        }
        if candle.high < candle.open.max(candle.close) {
            return Err(format!(
                "High ({}) is less than body top ({})",
                candle.high,
                candle.open.max(candle.close)
            ));
        }
        if candle.low > candle.open.min(candle.close) {
            return Err(format!(
                "Low ({}) is greater than body bottom ({})",
                candle.low,
                candle.open.min(candle.close)
            ));
        }
        Ok(())
    }
}

impl Default for CandleValidator {
    fn default() -> Self {
        Self::new()
    }
}

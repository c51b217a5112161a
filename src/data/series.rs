use super::validator::{CandleValidator, ValidationReport};
use crate::models::{Candle, Timeframe};
use chrono::{DateTime, Utc};

/// Validated, ascending candle history for one (instrument, timeframe) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    instrument: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl Series {
    /// Build a series, silently dropping candles that fail validation
    pub fn from_candles(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Self {
        Self::validated(instrument, timeframe, candles).0
    }

    /// Build a series and return what validation dropped
    pub fn validated(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> (Self, ValidationReport) {
        let (candles, report) = CandleValidator::new().validate_batch(candles);
        let series = Self {
            instrument: instrument.into(),
            timeframe,
            candles,
        };
        (series, report)
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Candles whose bar has fully elapsed at `now`
    ///
    /// Only the trailing candle can still be forming, so at most one is cut.
    pub fn closed(&self, now: DateTime<Utc>) -> &[Candle] {
        match self.candles.last() {
            Some(last) if last.timestamp + self.timeframe.duration() > now => {
                &self.candles[..self.candles.len() - 1]
            }
            _ => &self.candles,
        }
    }
}

/// Close prices of a candle slice
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

use super::validator::CandleValidator;
use super::{Series, SeriesSource};
use crate::models::{Candle, Timeframe};
use crate::strategy::filters::MarketContext;
use crate::{EngineError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

type SeriesKey = (String, Timeframe);

/// Thread-safe in-memory store for candle data
///
/// Maintains a rolling window of candles per (instrument, timeframe) plus the
/// latest market context per instrument.
#[derive(Clone)]
pub struct CandleStore {
    data: Arc<RwLock<HashMap<SeriesKey, VecDeque<Candle>>>>,
    context: Arc<RwLock<HashMap<String, MarketContext>>>,
    max_candles: usize,
}

impl CandleStore {
    /// Create a new candle store
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep per series
    pub fn new(max_candles: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            context: Arc::new(RwLock::new(HashMap::new())),
            max_candles,
        }
    }

    // A panicked writer cannot leave a half-pushed candle, so poisoning is ignored
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SeriesKey, VecDeque<Candle>>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SeriesKey, VecDeque<Candle>>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a candle to a series
    ///
    /// A candle with the same timestamp as the newest one replaces it (the
    /// forming bar was updated); older candles are ignored. Invalid candles
    /// are reported once here and never stored. Returns whether the store
    /// changed.
    pub fn add_candle(&self, timeframe: Timeframe, candle: Candle) -> bool {
        if let Err(reason) = CandleValidator::new().validate(&candle) {
            warn!(
                "Rejecting {} {} candle at {}: {}",
                candle.instrument, timeframe, candle.timestamp, reason
            );
            return false;
        }

        let mut data = self.write();
        let series = data
            .entry((candle.instrument.clone(), timeframe))
            .or_default();

        match series.back() {
            Some(last) if candle.timestamp < last.timestamp => return false,
            Some(last) if candle.timestamp == last.timestamp => {
                series.pop_back();
            }
            _ => {}
        }
        series.push_back(candle);

        // Remove oldest if exceeds max
        while series.len() > self.max_candles {
            series.pop_front();
        }
        true
    }

    /// Add many candles, returning how many changed the store
    pub fn extend(&self, timeframe: Timeframe, candles: impl IntoIterator<Item = Candle>) -> usize {
        candles
            .into_iter()
            .map(|c| self.add_candle(timeframe, c))
            .filter(|changed| *changed)
            .count()
    }

    /// Get all candles for a series
    pub fn get_candles(&self, instrument: &str, timeframe: Timeframe) -> Vec<Candle> {
        self.read()
            .get(&(instrument.to_string(), timeframe))
            .map(|deque| deque.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get the N most recent candles for a series
    pub fn get_recent_candles(&self, instrument: &str, timeframe: Timeframe, n: usize) -> Vec<Candle> {
        self.read()
            .get(&(instrument.to_string(), timeframe))
            .map(|deque| deque.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Get count of candles for a series
    pub fn candle_count(&self, instrument: &str, timeframe: Timeframe) -> usize {
        self.read()
            .get(&(instrument.to_string(), timeframe))
            .map(|d| d.len())
            .unwrap_or(0)
    }

    /// Get all tracked instruments
    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().map(|(i, _)| i.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn set_market_context(&self, instrument: &str, context: MarketContext) {
        self.context
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(instrument.to_string(), context);
    }

    /// Clear all data for an instrument
    pub fn clear_instrument(&self, instrument: &str) {
        self.write().retain(|(i, _), _| i != instrument);
        self.context
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(instrument);
    }
}

impl SeriesSource for CandleStore {
    fn get_series(&self, instrument: &str, timeframe: Timeframe) -> Result<Series> {
        let data = self.read();
        let candles = data
            .get(&(instrument.to_string(), timeframe))
            .ok_or_else(|| EngineError::UnknownInstrument(format!("{} {}", instrument, timeframe)))?;
        Ok(Series::from_candles(
            instrument,
            timeframe,
            candles.iter().cloned().collect(),
        ))
    }

    fn market_context(&self, instrument: &str) -> MarketContext {
        self.context
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(instrument)
            .cloned()
            .unwrap_or_default()
    }
}

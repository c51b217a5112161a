use super::store::CandleStore;
use super::synthetic::{bar_open, MarketScenario, SyntheticDataGenerator};
use crate::models::{Candle, Timeframe};
use crate::strategy::filters::MarketContext;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Market-data collaborator that keeps a `CandleStore` current
pub trait CandleFeed: Send {
    /// Pull whatever is new up to `now`; returns how many candles changed
    fn refresh(&mut self, store: &CandleStore, now: DateTime<Utc>) -> Result<usize, FeedError>;
}

/// Reads candle history from JSON files
///
/// Layout: `<dir>/<INSTRUMENT>_<timeframe>.json` holding an array of candles
/// (e.g. `NIFTY_5m.json`) and an optional `<dir>/<INSTRUMENT>_context.json`
/// holding a market context object.
pub struct FileFeed {
    dir: PathBuf,
    instruments: Vec<String>,
    timeframes: Vec<Timeframe>,
}

impl FileFeed {
    pub fn new(dir: impl Into<PathBuf>, instruments: Vec<String>, timeframes: Vec<Timeframe>) -> Self {
        Self {
            dir: dir.into(),
            instruments,
            timeframes,
        }
    }

    pub fn series_path(&self, instrument: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{}_{}.json", instrument, timeframe))
    }

    pub fn context_path(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{}_context.json", instrument))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, FeedError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(FeedError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| FeedError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

impl CandleFeed for FileFeed {
    fn refresh(&mut self, store: &CandleStore, now: DateTime<Utc>) -> Result<usize, FeedError> {
        let mut changed = 0;

        for instrument in &self.instruments {
            for &timeframe in &self.timeframes {
                let path = self.series_path(instrument, timeframe);
                let Some(candles) = read_json::<Vec<Candle>>(&path)? else {
                    debug!("No candle file at {}", path.display());
                    continue;
                };
                // Files may hold a full day; only reveal what has started by now
                changed += store.extend(
                    timeframe,
                    candles.into_iter().filter(|c| c.timestamp <= now),
                );
            }

            if let Some(context) = read_json::<MarketContext>(&self.context_path(instrument))? {
                store.set_market_context(instrument, context);
            }
        }

        Ok(changed)
    }
}

/// Seeded random-walk feed for demo runs
pub struct SyntheticFeed {
    generator: SyntheticDataGenerator,
    instruments: Vec<(String, f64, MarketScenario)>,
    timeframes: Vec<Timeframe>,
    history: usize,
}

impl SyntheticFeed {
    pub fn new(seed: u64, timeframes: Vec<Timeframe>, history: usize) -> Self {
        Self {
            generator: SyntheticDataGenerator::new(seed),
            instruments: Vec::new(),
            timeframes,
            history,
        }
    }

    pub fn with_instrument(mut self, name: &str, start_price: f64, scenario: MarketScenario) -> Self {
        self.instruments
            .push((name.to_string(), start_price, scenario));
        self
    }
}

impl CandleFeed for SyntheticFeed {
    fn refresh(&mut self, store: &CandleStore, now: DateTime<Utc>) -> Result<usize, FeedError> {
        let mut changed = 0;

        for (name, start_price, scenario) in &self.instruments {
            for &timeframe in &self.timeframes {
                let current_bar = bar_open(now, timeframe);
                let last = store.get_recent_candles(name, timeframe, 1).pop();

                let candles = match last {
                    None => {
                        let start = current_bar - timeframe.duration() * (self.history as i32 - 1);
                        info!(
                            "Backfilling {} synthetic {} candles for {}",
                            self.history, timeframe, name
                        );
                        self.generator.generate(
                            name,
                            *scenario,
                            start,
                            *start_price,
                            self.history,
                            timeframe,
                        )
                    }
                    Some(last) if last.timestamp < current_bar => {
                        let missing = ((current_bar - last.timestamp).num_seconds()
                            / timeframe.duration().num_seconds()) as usize;
                        let start = last.timestamp + timeframe.duration();
                        self.generator
                            .generate(name, *scenario, start, last.close, missing, timeframe)
                    }
                    Some(_) => Vec::new(),
                };

                changed += store.extend(timeframe, candles);
            }
        }

        Ok(changed)
    }
}

// Market data: validated series, the in-memory store and the feeds that fill it

pub mod feed;
pub mod series;
pub mod store;
pub mod synthetic;
pub mod validator;

pub use feed::{CandleFeed, FeedError, FileFeed, SyntheticFeed};
pub use series::Series;
pub use store::CandleStore;
pub use validator::{CandleValidator, ValidationReport};

use crate::models::Timeframe;
use crate::strategy::filters::MarketContext;
use crate::Result;

/// Where the engine reads candle history and market context from
pub trait SeriesSource: Send + Sync {
    /// Deduplicated, ascending series; may still end with a forming bar
    fn get_series(&self, instrument: &str, timeframe: Timeframe) -> Result<Series>;

    fn market_context(&self, _instrument: &str) -> MarketContext {
        MarketContext::default()
    }
}

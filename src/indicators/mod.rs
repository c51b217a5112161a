// Technical indicators module
// Implements MA, RSI, ATR, ADX, MACD, Bollinger and volume/structure helpers

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod market_analysis;
pub mod moving_average;
pub mod rsi;

pub use adx::{adx_min_candles, adx_series, calculate_adx, AdxReading};
pub use atr::{atr_series, calculate_atr};
pub use bollinger::{calculate_bollinger, BollingerBands};
pub use macd::{calculate_macd, macd_series, MacdPoint};
pub use market_analysis::{
    calculate_average_volume, calculate_volume_ratio, is_volume_spike, returns_correlation,
    swing_high, swing_low,
};
pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};
pub use rsi::{calculate_rsi, rsi_series};

/// Maps non-finite values to `None` so NaN never leaks into decisions
pub(crate) fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

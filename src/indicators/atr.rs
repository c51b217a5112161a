/// Average True Range (ATR) indicator
///
/// Measures market volatility by calculating the average of true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing (same as RSI and ADX) for the moving average.
use crate::models::Candle;

/// True range of `candles[i]` against the previous close (`i >= 1`)
pub(crate) fn true_range(candles: &[Candle], i: usize) -> f64 {
    let high = candles[i].high;
    let low = candles[i].low;
    let prev_close = candles[i - 1].close;

    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// ATR aligned with `candles`
///
/// The first ATR sits at index `period` and is the simple average of the true
/// ranges of bars 1..=period; later values use Wilder's smoothing.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    // First ATR is simple average of first 'period' true ranges
    let mut atr = (1..=period).map(|i| true_range(candles, i)).sum::<f64>() / period as f64;
    out[period] = super::finite(atr);

    // Apply Wilder's smoothing for subsequent values
    for i in (period + 1)..candles.len() {
        atr = (atr * (period as f64 - 1.0) + true_range(candles, i)) / period as f64;
        out[i] = super::finite(atr);
    }

    out
}

/// Calculate ATR for the given candles
///
/// Returns the current ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    atr_series(candles, period).last().copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                instrument: "TEST".to_string(),
                timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_atr() {
        // Low volatility market
        let low_vol_prices = vec![(100.0, 101.0, 99.0, 100.0); 15];

        let candles = create_test_candles(&low_vol_prices);
        let atr = calculate_atr(&candles, 14);

        // Every bar spans exactly 2.0 and closes mid-range
        assert!((atr.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        // High volatility market with gaps
        let high_vol_prices = vec![
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ];

        let candles = create_test_candles(&high_vol_prices);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_some());
        // ATR should be higher for volatile market
        assert!(atr.unwrap() > 10.0);
    }

    #[test]
    fn test_true_range_uses_previous_close_gap() {
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0), (110.0, 112.0, 109.0, 111.0)]);
        // Gap up: high - prev_close = 12 beats high - low = 3
        assert_eq!(true_range(&candles, 1), 12.0);
    }

    #[test]
    fn test_wilder_smoothing() {
        let mut prices = vec![(100.0, 101.0, 99.0, 100.0); 3];
        prices.push((100.0, 104.0, 96.0, 100.0));
        let candles = create_test_candles(&prices);

        let series = atr_series(&candles, 2);
        assert_eq!(series[..2], [None, None]);
        assert_eq!(series[2], Some(2.0));
        // (2.0 * 1 + 8.0) / 2
        assert_eq!(series[3], Some(5.0));
    }

    #[test]
    fn test_insufficient_data() {
        let prices = vec![(100.0, 101.0, 99.0, 100.0), (100.0, 101.0, 99.0, 100.0)];

        let candles = create_test_candles(&prices);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_none());
    }
}

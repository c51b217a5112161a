/// Volume and price-structure helpers
///
/// Every "trailing" helper looks at the `lookback` candles before the current
/// (last) candle, so the bar being judged never contributes to its own baseline.
use crate::models::Candle;

fn trailing_window(candles: &[Candle], lookback: usize) -> Option<&[Candle]> {
    if lookback == 0 || candles.len() < lookback + 1 {
        return None;
    }
    let end = candles.len() - 1;
    Some(&candles[end - lookback..end])
}

/// Average volume of the `lookback` candles preceding the current one
pub fn calculate_average_volume(candles: &[Candle], lookback: usize) -> Option<f64> {
    let window = trailing_window(candles, lookback)?;
    let total_volume: f64 = window.iter().map(|c| c.volume).sum();
    super::finite(total_volume / lookback as f64)
}

/// Current volume divided by the trailing average volume
///
/// Returns None when the average is zero or there is not enough history.
pub fn calculate_volume_ratio(candles: &[Candle], lookback: usize) -> Option<f64> {
    let avg_volume = calculate_average_volume(candles, lookback)?;
    if avg_volume <= 0.0 {
        return None;
    }
    let current_volume = candles.last()?.volume;
    super::finite(current_volume / avg_volume)
}

/// Check if volume has spiked above threshold
///
/// Returns true if current volume >= threshold * recent average volume
pub fn is_volume_spike(candles: &[Candle], lookback: usize, threshold: f64) -> bool {
    calculate_volume_ratio(candles, lookback).is_some_and(|ratio| ratio >= threshold)
}

/// Highest high of the `lookback` candles preceding the current one
pub fn swing_high(candles: &[Candle], lookback: usize) -> Option<f64> {
    trailing_window(candles, lookback)?
        .iter()
        .map(|c| c.high)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))))
}

/// Lowest low of the `lookback` candles preceding the current one
pub fn swing_low(candles: &[Candle], lookback: usize) -> Option<f64> {
    trailing_window(candles, lookback)?
        .iter()
        .map(|c| c.low)
        .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))))
}

/// Close-to-close simple returns
pub fn returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// Pearson correlation of the close-to-close returns of two series
///
/// Both series are aligned on their most recent values. Needs at least three
/// overlapping returns; a constant series has no defined correlation.
pub fn returns_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let ra = returns(a);
    let rb = returns(b);
    let n = ra.len().min(rb.len());
    if n < 3 {
        return None;
    }
    let xs = &ra[ra.len() - n..];
    let ys = &rb[rb.len() - n..];

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    super::finite((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

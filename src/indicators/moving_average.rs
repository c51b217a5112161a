/// Calculate Simple Moving Average (SMA) of the most recent `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    super::finite(sum / period as f64)
}

/// SMA aligned with the input; the first `period - 1` entries are `None`
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let mut sum: f64 = prices[..period].iter().sum();
    out[period - 1] = super::finite(sum / period as f64);
    for i in period..prices.len() {
        sum += prices[i] - prices[i - period];
        out[i] = super::finite(sum / period as f64);
    }
    out
}

/// Exponential Moving Average aligned with the input
///
/// Multiplier k = 2 / (period + 1). Seeded with the SMA of the first `period`
/// values at index `period - 1`, then EMA[i] = (P[i] - EMA[i-1]) * k + EMA[i-1].
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Start with SMA
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = super::finite(ema);

    for i in period..prices.len() {
        ema = (prices[i] - ema) * multiplier + ema;
        out[i] = super::finite(ema);
    }

    out
}

/// Calculate the latest Exponential Moving Average (EMA)
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied().flatten()
}

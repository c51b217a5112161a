/// Moving Average Convergence Divergence (MACD)
///
/// - MACD line: EMA(fast) - EMA(slow)
/// - Signal line: EMA(signal_period) of the MACD line
/// - Histogram: MACD line - signal line
use super::moving_average::ema_series;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD aligned with `prices`
///
/// The MACD line starts at index `slow - 1`; the signal line needs
/// `signal_period` MACD values on top of that, so the first full point is at
/// index `slow + signal_period - 2`.
pub fn macd_series(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Vec<Option<MacdPoint>> {
    let mut out = vec![None; prices.len()];
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return out;
    }

    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => super::finite(f - s),
            _ => None,
        })
        .collect();

    // Signal EMA runs over the defined part of the MACD line only
    let start = match line.iter().position(|v| v.is_some()) {
        Some(start) => start,
        None => return out,
    };
    let defined: Option<Vec<f64>> = line[start..].iter().copied().collect();
    let defined = match defined {
        Some(values) => values,
        // A hole after the start means a non-finite input; suppress everything
        None => return out,
    };

    let signal = ema_series(&defined, signal_period);
    for (offset, sig) in signal.iter().enumerate() {
        if let Some(sig) = sig {
            let macd = defined[offset];
            out[start + offset] = Some(MacdPoint {
                macd,
                signal: *sig,
                histogram: macd - sig,
            });
        }
    }

    out
}

/// Latest MACD point (12/26/9 style parameters)
pub fn calculate_macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdPoint> {
    macd_series(prices, fast, slow, signal_period)
        .last()
        .copied()
        .flatten()
}

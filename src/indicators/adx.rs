/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// Also returns +DI and -DI to determine trend direction:
/// - +DI > -DI: Uptrend
/// - -DI > +DI: Downtrend
///
/// Wilder's definition: TR, +DM and -DM are smoothed from bar `period`,
/// DX is defined from bar `period`, and the first ADX (bar `2 * period - 1`)
/// is the simple mean of the first `period` DX values. Later ADX values use
/// Wilder's smoothing of DX.
use super::atr::true_range;
use crate::models::Candle;

/// One ADX reading with its directional indicators
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxReading {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Minimum number of candles needed for the first ADX value
pub fn adx_min_candles(period: usize) -> usize {
    2 * period
}

/// ADX readings aligned with `candles`
pub fn adx_series(candles: &[Candle], period: usize) -> Vec<Option<AdxReading>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n < adx_min_candles(period) {
        return out;
    }

    let p = period as f64;

    // Step 1: Directional movement for bar i against bar i - 1
    let directional = |i: usize| -> (f64, f64) {
        let up_move = candles[i].high - candles[i - 1].high;
        let down_move = candles[i - 1].low - candles[i].low;

        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        (plus_dm, minus_dm)
    };

    // Step 2: Seed the smoothed values with simple averages over bars 1..=period
    let mut smoothed_tr = 0.0;
    let mut smoothed_plus = 0.0;
    let mut smoothed_minus = 0.0;
    for i in 1..=period {
        let (plus_dm, minus_dm) = directional(i);
        smoothed_tr += true_range(candles, i);
        smoothed_plus += plus_dm;
        smoothed_minus += minus_dm;
    }
    smoothed_tr /= p;
    smoothed_plus /= p;
    smoothed_minus /= p;

    let mut dx_sum = 0.0;
    let mut adx = 0.0;

    for i in period..n {
        if i > period {
            let (plus_dm, minus_dm) = directional(i);
            smoothed_tr = (smoothed_tr * (p - 1.0) + true_range(candles, i)) / p;
            smoothed_plus = (smoothed_plus * (p - 1.0) + plus_dm) / p;
            smoothed_minus = (smoothed_minus * (p - 1.0) + minus_dm) / p;
        }

        // Step 3: +DI / -DI
        let (plus_di, minus_di) = if smoothed_tr > 0.0 {
            (
                smoothed_plus / smoothed_tr * 100.0,
                smoothed_minus / smoothed_tr * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        // Step 4: DX
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            (plus_di - minus_di).abs() / di_sum * 100.0
        } else {
            0.0
        };

        // Step 5: ADX
        if i < 2 * period - 1 {
            dx_sum += dx;
            continue;
        } else if i == 2 * period - 1 {
            adx = (dx_sum + dx) / p;
        } else {
            adx = (adx * (p - 1.0) + dx) / p;
        }

        if adx.is_finite() && plus_di.is_finite() && minus_di.is_finite() {
            out[i] = Some(AdxReading {
                adx,
                plus_di,
                minus_di,
            });
        }
    }

    out
}

/// Calculate ADX, +DI, and -DI for trend strength and direction
///
/// Returns (adx, plus_di, minus_di) or None if insufficient data
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<(f64, f64, f64)> {
    adx_series(candles, period)
        .last()
        .copied()
        .flatten()
        .map(|r| (r.adx, r.plus_di, r.minus_di))
}

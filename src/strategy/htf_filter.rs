use crate::indicators::{adx_min_candles, calculate_adx, ema_series};
use crate::models::{Candle, Direction};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Bars used for the alignment share that feeds `TrendState::strength`
const STRENGTH_WINDOW: usize = 5;

/// Configuration for the higher-timeframe trend filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrendFilterConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub min_separation_pct: f64, // |fast - slow| / slow, in percent
    pub alignment_candles: usize,
    pub adx_enabled: bool,
    pub adx_period: usize,
    pub min_adx: f64,
}

impl Default for TrendFilterConfig {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
            min_separation_pct: 0.2,
            alignment_candles: 3,
            adx_enabled: true,
            adx_period: 14,
            min_adx: 25.0,
        }
    }
}

impl TrendFilterConfig {
    /// Closed HTF candles needed before a trend can be classified
    pub fn min_candles(&self) -> usize {
        let adx_need = if self.adx_enabled {
            adx_min_candles(self.adx_period)
        } else {
            0
        };
        self.slow_period.max(adx_need) + self.alignment_candles.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Choppy,
}

impl TrendDirection {
    /// Trade direction, or None when the market is choppy
    pub fn as_direction(&self) -> Option<Direction> {
        match self {
            TrendDirection::Bullish => Some(Direction::Bullish),
            TrendDirection::Bearish => Some(Direction::Bearish),
            TrendDirection::Choppy => None,
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Bullish => f.write_str("bullish"),
            TrendDirection::Bearish => f.write_str("bearish"),
            TrendDirection::Choppy => f.write_str("choppy"),
        }
    }
}

/// HTF trend classification for one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct TrendState {
    pub direction: TrendDirection,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub separation_pct: f64, // signed: positive when fast is above slow
    pub aligned_candles: usize,
    pub adx: Option<f64>,
    pub strength: f64, // 0-100
}

impl TrendState {
    pub fn is_choppy(&self) -> bool {
        self.direction == TrendDirection::Choppy
    }

    /// One-line description used in signal rationale
    pub fn describe(&self) -> String {
        let mut text = format!(
            "HTF {} (EMA{:.0}/{:.0} sep {:+.2}%, {} aligned bars",
            self.direction, self.ema_fast, self.ema_slow, self.separation_pct, self.aligned_candles
        );
        if let Some(adx) = self.adx {
            text.push_str(&format!(", ADX {:.1}", adx));
        }
        text.push(')');
        text
    }
}

/// Classifies the higher-timeframe trend from fast/slow EMA separation,
/// alignment persistence and (optionally) ADX strength
#[derive(Debug, Clone)]
pub struct TrendFilter {
    config: TrendFilterConfig,
}

impl TrendFilter {
    pub fn new(config: TrendFilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendFilterConfig {
        &self.config
    }

    /// Classify the trend from closed HTF candles
    pub fn evaluate(&self, candles: &[Candle]) -> Result<TrendState> {
        let cfg = &self.config;
        let need = cfg.min_candles();
        if candles.len() < need {
            return Err(EngineError::insufficient("HTF trend", candles.len(), need));
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema_series(&closes, cfg.fast_period);
        let slow = ema_series(&closes, cfg.slow_period);

        let (ema_fast, ema_slow) = match (fast.last().copied().flatten(), slow.last().copied().flatten()) {
            (Some(f), Some(s)) if s != 0.0 => (f, s),
            _ => return Err(EngineError::InvalidIndicator { name: "EMA" }),
        };

        let separation_pct = (ema_fast - ema_slow) / ema_slow * 100.0;
        if !separation_pct.is_finite() {
            return Err(EngineError::InvalidIndicator { name: "EMA" });
        }
        let aligned_candles = aligned_run(&fast, &slow);

        let adx = if cfg.adx_enabled {
            match calculate_adx(candles, cfg.adx_period) {
                Some((adx, _, _)) => Some(adx),
                None => return Err(EngineError::InvalidIndicator { name: "ADX" }),
            }
        } else {
            None
        };

        let adx_ok = adx.map_or(true, |value| value >= cfg.min_adx);
        let persistent = aligned_candles >= cfg.alignment_candles;

        let direction = if separation_pct >= cfg.min_separation_pct && persistent && adx_ok {
            TrendDirection::Bullish
        } else if separation_pct <= -cfg.min_separation_pct && persistent && adx_ok {
            TrendDirection::Bearish
        } else {
            TrendDirection::Choppy
        };

        let alignment_share = aligned_candles.min(STRENGTH_WINDOW) as f64 / STRENGTH_WINDOW as f64;
        let strength = (separation_pct.abs() * 10.0 * 0.6 + alignment_share * 100.0 * 0.4).min(100.0);

        let state = TrendState {
            direction,
            ema_fast,
            ema_slow,
            separation_pct,
            aligned_candles,
            adx,
            strength,
        };

        debug!(
            "HTF trend: {} sep={:.3}% aligned={} adx={:?} strength={:.1}",
            state.direction, separation_pct, aligned_candles, adx, strength
        );

        Ok(state)
    }
}

/// Consecutive most recent bars with the same fast/slow ordering as the last bar
fn aligned_run(fast: &[Option<f64>], slow: &[Option<f64>]) -> usize {
    let ordering = |i: usize| match (fast[i], slow[i]) {
        (Some(f), Some(s)) if f > s => Some(Direction::Bullish),
        (Some(f), Some(s)) if f < s => Some(Direction::Bearish),
        _ => None,
    };

    let Some(latest) = fast.len().checked_sub(1).and_then(ordering) else {
        return 0;
    };

    (0..fast.len())
        .rev()
        .take_while(|&i| ordering(i) == Some(latest))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Hourly candles on a straight line: close = start + slope * i
    fn create_trend_candles(count: usize, start: f64, slope: f64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 5, 3, 45, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = start + slope * i as f64;
                let open = close - slope;
                Candle {
                    instrument: "NIFTY".to_string(),
                    timestamp: base + Duration::hours(i as i64),
                    open,
                    high: open.max(close) + 10.0,
                    low: open.min(close) - 10.0,
                    close,
                    volume: 10_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_min_candles() {
        let config = TrendFilterConfig::default();
        // max(50, 28) + 3 - 1
        assert_eq!(config.min_candles(), 52);

        let no_adx = TrendFilterConfig {
            adx_enabled: false,
            slow_period: 10,
            fast_period: 5,
            ..Default::default()
        };
        assert_eq!(no_adx.min_candles(), 12);
    }

    #[test]
    fn test_bullish_trend() {
        let filter = TrendFilter::new(TrendFilterConfig::default());
        let candles = create_trend_candles(120, 20_000.0, 8.0);

        let state = filter.evaluate(&candles).unwrap();
        assert_eq!(state.direction, TrendDirection::Bullish);
        // EMA20 lags 9.5 bars, EMA50 lags 24.5 bars on a straight line
        assert!((state.ema_fast - state.ema_slow - 120.0).abs() < 1e-6);
        assert!(state.separation_pct > 0.5 && state.separation_pct < 0.6);
        assert_eq!(state.aligned_candles, 71);
        assert!((state.adx.unwrap() - 100.0).abs() < 1e-9);
        assert!(state.strength > 40.0 && state.strength < 50.0);
        assert_eq!(state.direction.as_direction(), Some(Direction::Bullish));
    }

    #[test]
    fn test_bearish_trend() {
        let filter = TrendFilter::new(TrendFilterConfig::default());
        let candles = create_trend_candles(120, 20_000.0, -8.0);

        let state = filter.evaluate(&candles).unwrap();
        assert_eq!(state.direction, TrendDirection::Bearish);
        assert!(state.separation_pct < -0.5);
        assert_eq!(state.direction.as_direction(), Some(Direction::Bearish));
    }

    #[test]
    fn test_small_separation_is_choppy() {
        let filter = TrendFilter::new(TrendFilterConfig::default());
        // 15 * 0.6 = 9 points of separation on ~20,000: about 0.045%
        let candles = create_trend_candles(120, 20_000.0, 0.6);

        let state = filter.evaluate(&candles).unwrap();
        assert!(state.separation_pct > 0.0 && state.separation_pct < 0.05);
        assert!(state.is_choppy());
        assert_eq!(state.direction.as_direction(), None);
    }

    #[test]
    fn test_weak_adx_is_choppy() {
        let filter = TrendFilter::new(TrendFilterConfig {
            min_adx: 100.5,
            ..Default::default()
        });
        let candles = create_trend_candles(120, 20_000.0, 8.0);
        assert!(filter.evaluate(&candles).unwrap().is_choppy());

        let no_adx = TrendFilter::new(TrendFilterConfig {
            adx_enabled: false,
            min_adx: 100.5,
            ..Default::default()
        });
        let state = no_adx.evaluate(&candles).unwrap();
        assert_eq!(state.direction, TrendDirection::Bullish);
        assert!(state.adx.is_none());
    }

    #[test]
    fn test_insufficient_data() {
        let filter = TrendFilter::new(TrendFilterConfig::default());
        let candles = create_trend_candles(40, 20_000.0, 8.0);

        let err = filter.evaluate(&candles).unwrap_err();
        assert_eq!(err, EngineError::insufficient("HTF trend", 40, 52));
    }

    #[test]
    fn test_non_finite_ema_is_invalid_indicator() {
        let filter = TrendFilter::new(TrendFilterConfig::default());
        let candles = create_trend_candles(60, 1e307, 1e305);

        let err = filter.evaluate(&candles).unwrap_err();
        assert_eq!(err, EngineError::InvalidIndicator { name: "EMA" });
    }

    #[test]
    fn test_aligned_run() {
        let fast = vec![None, Some(1.0), Some(3.0), Some(3.0), Some(4.0)];
        let slow = vec![None, Some(2.0), Some(2.0), Some(2.5), Some(3.0)];
        assert_eq!(aligned_run(&fast, &slow), 3);

        let crossed = vec![None, Some(3.0), Some(3.0), Some(2.0)];
        let base = vec![None, Some(2.0), Some(2.0), Some(2.5)];
        assert_eq!(aligned_run(&crossed, &base), 1);

        let equal = vec![Some(1.0)];
        assert_eq!(aligned_run(&equal, &equal), 0);
        assert_eq!(aligned_run(&[], &[]), 0);
    }
}

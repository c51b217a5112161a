use super::htf_filter::TrendDirection;
use crate::indicators::{calculate_volume_ratio, ema_series, swing_high, swing_low};
use crate::models::{Candle, Direction, PatternKind};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for lower-timeframe entry detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntryConfig {
    pub ema_period: usize,
    pub pullback_window: usize, // Candles before the trigger that may touch the EMA
    pub volume_lookback: usize,
    pub pullback_volume_multiplier: f64,
    pub structure_lookback: usize,
    pub structure_volume_multiplier: f64,
    pub max_close_from_extreme: f64, // Fraction of range between close and bar extreme
    pub min_body_ratio: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            ema_period: 9,
            pullback_window: 3,
            volume_lookback: 20,
            pullback_volume_multiplier: 1.2,
            structure_lookback: 10,
            structure_volume_multiplier: 1.5,
            max_close_from_extreme: 0.25,
            min_body_ratio: 0.6,
        }
    }
}

impl EntryConfig {
    pub fn min_candles(&self) -> usize {
        self.ema_period
            .max(self.volume_lookback)
            .max(self.structure_lookback)
            + self.pullback_window
            + 1
    }
}

/// Entry pattern with the price level that defined it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryPattern {
    /// Retrace to the EMA followed by a trend-direction close beyond it
    Pullback { ema_level: f64, touch_index: usize },
    /// Close beyond the recent swing extreme on expanded volume
    StructureBreak { broken_level: f64 },
}

impl EntryPattern {
    pub fn kind(&self) -> PatternKind {
        match self {
            EntryPattern::Pullback { .. } => PatternKind::Pullback,
            EntryPattern::StructureBreak { .. } => PatternKind::StructureBreak,
        }
    }
}

/// Entry setup found on the latest closed LTF candle
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignalCandidate {
    pub pattern: EntryPattern,
    pub direction: Direction,
    pub trigger_candle_index: usize,
    pub trigger_price: f64,
    pub volume_ratio: f64,
    pub body_ratio: f64,
    pub wick_ratio: f64, // Opposing wick / body
}

impl EntrySignalCandidate {
    pub fn describe(&self) -> String {
        match self.pattern {
            EntryPattern::Pullback { ema_level, .. } => format!(
                "{} pullback to EMA {:.2}, volume {:.2}x",
                self.direction, ema_level, self.volume_ratio
            ),
            EntryPattern::StructureBreak { broken_level } => format!(
                "{} structure break through {:.2}, volume {:.2}x",
                self.direction, broken_level, self.volume_ratio
            ),
        }
    }
}

/// Everything the pattern predicates look at, computed once per detection
struct TriggerContext<'a> {
    candles: &'a [Candle],
    ema: &'a [Option<f64>],
    direction: Direction,
    volume_ratio: f64,
}

impl TriggerContext<'_> {
    fn trigger_index(&self) -> usize {
        self.candles.len() - 1
    }

    fn trigger(&self) -> &Candle {
        &self.candles[self.trigger_index()]
    }
}

type PatternPredicate = fn(&EntryDetector, &TriggerContext) -> Option<EntryPattern>;

/// Patterns in priority order; the first match wins
const PATTERNS: [PatternPredicate; 2] = [EntryDetector::pullback, EntryDetector::structure_break];

/// Looks for a pullback or structure-break entry in the HTF trend direction
#[derive(Debug, Clone)]
pub struct EntryDetector {
    config: EntryConfig,
}

impl EntryDetector {
    pub fn new(config: EntryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EntryConfig {
        &self.config
    }

    /// Scan the latest closed LTF candle for an entry in the trend direction
    ///
    /// A choppy trend returns `Ok(None)` without looking at the candles.
    pub fn detect(
        &self,
        candles: &[Candle],
        trend: TrendDirection,
    ) -> Result<Option<EntrySignalCandidate>> {
        let Some(direction) = trend.as_direction() else {
            return Ok(None);
        };

        let need = self.config.min_candles();
        if candles.len() < need {
            return Err(EngineError::insufficient("LTF entry", candles.len(), need));
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let ema = ema_series(&closes, self.config.ema_period);
        if ema.last().copied().flatten().is_none() {
            return Err(EngineError::InvalidIndicator { name: "EMA" });
        }

        // Zero average volume (volume-less index feeds) can never confirm
        let volume_ratio = calculate_volume_ratio(candles, self.config.volume_lookback).unwrap_or(0.0);

        let ctx = TriggerContext {
            candles,
            ema: &ema,
            direction,
            volume_ratio,
        };

        let Some(pattern) = PATTERNS.iter().find_map(|predicate| predicate(self, &ctx)) else {
            debug!(
                "No LTF entry for {} ({} trend, volume {:.2}x)",
                ctx.trigger().instrument, direction, volume_ratio
            );
            return Ok(None);
        };

        let trigger = ctx.trigger();
        let candidate = EntrySignalCandidate {
            pattern,
            direction,
            trigger_candle_index: ctx.trigger_index(),
            trigger_price: trigger.close,
            volume_ratio,
            body_ratio: trigger.body_ratio(),
            wick_ratio: trigger.opposing_wick_ratio(direction),
        };
        debug!("LTF entry for {}: {}", trigger.instrument, candidate.describe());

        Ok(Some(candidate))
    }

    fn pullback(&self, ctx: &TriggerContext) -> Option<EntryPattern> {
        let trigger = ctx.trigger();
        let index = ctx.trigger_index();
        let ema_now = ctx.ema[index]?;

        let closes_beyond = match ctx.direction {
            Direction::Bullish => trigger.close > ema_now,
            Direction::Bearish => trigger.close < ema_now,
        };
        if !closes_beyond
            || !trigger.closes_in(ctx.direction)
            || ctx.volume_ratio < self.config.pullback_volume_multiplier
            || trigger.body_ratio() < self.config.min_body_ratio
        {
            return None;
        }

        // Most recent candle in the window that reached the EMA
        let touch_index = (index - self.config.pullback_window..index)
            .rev()
            .find(|&i| {
                let Some(level) = ctx.ema[i] else {
                    return false;
                };
                match ctx.direction {
                    Direction::Bullish => ctx.candles[i].low <= level,
                    Direction::Bearish => ctx.candles[i].high >= level,
                }
            })?;

        Some(EntryPattern::Pullback {
            ema_level: ema_now,
            touch_index,
        })
    }

    fn structure_break(&self, ctx: &TriggerContext) -> Option<EntryPattern> {
        let trigger = ctx.trigger();
        let range = trigger.range();
        if range <= 0.0
            || !trigger.closes_in(ctx.direction)
            || ctx.volume_ratio < self.config.structure_volume_multiplier
        {
            return None;
        }

        let max_gap = self.config.max_close_from_extreme * range;
        match ctx.direction {
            Direction::Bullish => {
                let level = swing_high(ctx.candles, self.config.structure_lookback)?;
                (trigger.close > level && trigger.high - trigger.close <= max_gap)
                    .then_some(EntryPattern::StructureBreak { broken_level: level })
            }
            Direction::Bearish => {
                let level = swing_low(ctx.candles, self.config.structure_lookback)?;
                (trigger.close < level && trigger.close - trigger.low <= max_gap)
                    .then_some(EntryPattern::StructureBreak { broken_level: level })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Alternating trend steps and smaller counter steps; the last candle is a
    /// trend step with `last_volume`. Counter candles dip to the EMA.
    fn create_pullback_candles(count: usize, direction: Direction, last_volume: f64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let s = direction.sign();
        let mut prev = 22_000.0;
        (0..count)
            .map(|i| {
                let open = prev;
                let (close, high, low) = if i % 2 == 1 {
                    let close = open + s * 1.0;
                    (close, open.max(close) + 0.05, open.min(close) - 0.05)
                } else {
                    let close = open - s * 0.8;
                    let (top, bottom) = (open.max(close), open.min(close));
                    if s > 0.0 {
                        (close, top + 0.05, bottom - 0.3)
                    } else {
                        (close, top + 0.3, bottom - 0.05)
                    }
                };
                prev = close;
                Candle {
                    instrument: "NIFTY".to_string(),
                    timestamp: base + Duration::minutes(5 * i as i64),
                    open,
                    high,
                    low,
                    close,
                    volume: if i == count - 1 { last_volume } else { 1000.0 },
                }
            })
            .collect()
    }

    /// Steady climb of 2 points per bar with tight lows: never touches the EMA
    fn create_breakout_candles(count: usize, last_volume: f64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let open = 22_000.0 + 2.0 * i as f64;
                let close = open + 2.0;
                Candle {
                    instrument: "NIFTY".to_string(),
                    timestamp: base + Duration::minutes(5 * i as i64),
                    open,
                    high: close + 0.1,
                    low: open - 0.1,
                    close,
                    volume: if i == count - 1 { last_volume } else { 1000.0 },
                }
            })
            .collect()
    }

    #[test]
    fn test_min_candles() {
        // max(9, 20, 10) + 3 + 1
        assert_eq!(EntryConfig::default().min_candles(), 24);
    }

    #[test]
    fn test_bullish_pullback() {
        let detector = EntryDetector::new(EntryConfig::default());
        let candles = create_pullback_candles(60, Direction::Bullish, 1300.0);

        let candidate = detector
            .detect(&candles, TrendDirection::Bullish)
            .unwrap()
            .expect("pullback expected");

        assert_eq!(candidate.direction, Direction::Bullish);
        assert_eq!(candidate.pattern.kind(), PatternKind::Pullback);
        assert_eq!(candidate.trigger_candle_index, 59);
        assert_eq!(candidate.trigger_price, candles[59].close);
        assert!((candidate.volume_ratio - 1.3).abs() < 1e-9);
        assert!(candidate.body_ratio > 0.9);
        assert!(candidate.wick_ratio < 0.1);
        match candidate.pattern {
            EntryPattern::Pullback { ema_level, touch_index } => {
                assert!(ema_level < candles[59].close);
                assert_eq!(touch_index, 58);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
    }

    #[test]
    fn test_bearish_pullback() {
        let detector = EntryDetector::new(EntryConfig::default());
        let candles = create_pullback_candles(60, Direction::Bearish, 1300.0);

        let candidate = detector
            .detect(&candles, TrendDirection::Bearish)
            .unwrap()
            .expect("pullback expected");
        assert_eq!(candidate.direction, Direction::Bearish);
        assert_eq!(candidate.pattern.kind(), PatternKind::Pullback);
    }

    #[test]
    fn test_pullback_needs_volume() {
        let detector = EntryDetector::new(EntryConfig::default());
        let candles = create_pullback_candles(60, Direction::Bullish, 1100.0);
        assert!(detector
            .detect(&candles, TrendDirection::Bullish)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_direction_must_match_trend() {
        let detector = EntryDetector::new(EntryConfig::default());
        // Bullish trigger candle, bearish trend: nothing in trend direction
        let candles = create_pullback_candles(60, Direction::Bullish, 1300.0);
        assert!(detector
            .detect(&candles, TrendDirection::Bearish)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_structure_break() {
        let detector = EntryDetector::new(EntryConfig::default());
        let candles = create_breakout_candles(40, 2000.0);

        let candidate = detector
            .detect(&candles, TrendDirection::Bullish)
            .unwrap()
            .expect("structure break expected");
        match candidate.pattern {
            EntryPattern::StructureBreak { broken_level } => {
                // Highest high of the ten candles before the trigger
                assert!((broken_level - candles[38].high).abs() < 1e-9);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
    }

    #[test]
    fn test_structure_break_needs_more_volume_than_pullback() {
        let detector = EntryDetector::new(EntryConfig::default());
        let candles = create_breakout_candles(40, 1300.0);
        assert!(detector
            .detect(&candles, TrendDirection::Bullish)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_choppy_skips_scan() {
        let detector = EntryDetector::new(EntryConfig::default());
        // Too short for a scan, but choppy returns before the length check
        let candles = create_pullback_candles(5, Direction::Bullish, 1300.0);
        assert_eq!(detector.detect(&candles, TrendDirection::Choppy), Ok(None));
    }

    #[test]
    fn test_insufficient_data() {
        let detector = EntryDetector::new(EntryConfig::default());
        let candles = create_pullback_candles(10, Direction::Bullish, 1300.0);
        let err = detector
            .detect(&candles, TrendDirection::Bullish)
            .unwrap_err();
        assert!(err.is_insufficient_data());
    }
}

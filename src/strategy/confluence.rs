use super::filters::FilterReport;
use super::htf_filter::TrendState;
use super::ltf_entry::EntrySignalCandidate;
use crate::indicators::calculate_atr;
use crate::models::{Candle, Direction, PatternKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Separation (percent) that earns the full separation credit
const FULL_SEPARATION_PCT: f64 = 0.5;
/// Aligned HTF bars that earn the full alignment credit
const FULL_ALIGNMENT_BARS: f64 = 5.0;

/// Maximum points per confluence factor; they add up to 10
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub trend: f64,
    pub pattern: f64,
    pub rsi: f64,
    pub candle: f64,
    pub context: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            trend: 3.0,
            pattern: 2.5,
            rsi: 2.0,
            candle: 1.5,
            context: 1.0,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.trend + self.pattern + self.rsi + self.candle + self.context
    }
}

/// How the protective stop is placed relative to the entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopRule {
    /// Fixed percentage of the entry price
    Percent { pct: f64 },
    /// Multiple of the LTF Average True Range
    Atr { period: usize, multiplier: f64 },
}

impl Default for StopRule {
    fn default() -> Self {
        StopRule::Atr {
            period: 14,
            multiplier: 1.5,
        }
    }
}

impl StopRule {
    /// Distance from entry to stop, or None when it cannot be computed
    pub fn distance(&self, entry: f64, candles: &[Candle]) -> Option<f64> {
        let distance = match *self {
            StopRule::Percent { pct } => entry * pct / 100.0,
            StopRule::Atr { period, multiplier } => calculate_atr(candles, period)? * multiplier,
        };
        (distance.is_finite() && distance > 0.0).then_some(distance)
    }
}

/// Configuration for confluence scoring and price levels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub min_score: f64,
    pub min_risk_reward: f64,
    pub extra_target_multiples: Vec<f64>, // Additional R multiples beyond the primary target
    pub stop_rule: StopRule,
    pub weights: ScoreWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_score: 6.0,
            min_risk_reward: 2.0,
            extra_target_multiples: vec![3.0, 4.0],
            stop_rule: StopRule::default(),
            weights: ScoreWeights::default(),
        }
    }
}

/// Points earned per factor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreComponents {
    pub trend: f64,
    pub pattern: f64,
    pub rsi: f64,
    pub candle: f64,
    pub context: f64,
}

impl ScoreComponents {
    pub fn total(&self) -> f64 {
        self.trend + self.pattern + self.rsi + self.candle + self.context
    }
}

impl fmt::Display for ScoreComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trend {:.1}, pattern {:.1}, RSI {:.1}, candle {:.1}, context {:.1}",
            self.trend, self.pattern, self.rsi, self.candle, self.context
        )
    }
}

/// Scored, fully priced setup ready for sizing
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSetup {
    pub direction: Direction,
    pub pattern: PatternKind,
    pub score: f64,
    pub components: ScoreComponents,
    pub reasons: Vec<String>,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub extra_targets: Vec<f64>,
    pub risk_reward_ratio: f64,
}

impl ScoredSetup {
    pub fn stop_distance(&self) -> f64 {
        (self.entry_price - self.stop_price).abs()
    }

    /// Primary target followed by the extra targets
    pub fn targets(&self) -> Vec<f64> {
        std::iter::once(self.target_price)
            .chain(self.extra_targets.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreRejection {
    BelowThreshold { score: f64, min_score: f64 },
    InvalidStop,
}

impl fmt::Display for ScoreRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreRejection::BelowThreshold { score, min_score } => {
                write!(f, "confluence {:.1}/10 below minimum {:.1}", score, min_score)
            }
            ScoreRejection::InvalidStop => f.write_str("stop distance could not be computed"),
        }
    }
}

/// Weighs trend, pattern, momentum, candle and context evidence into a 0-10
/// score and prices the setup
#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    config: ScoringConfig,
}

impl ConfluenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Points per factor for a candidate that passed the filters
    pub fn components(
        &self,
        trend: &TrendState,
        candidate: &EntrySignalCandidate,
        report: &FilterReport,
    ) -> ScoreComponents {
        let w = &self.config.weights;

        let separation = unit(trend.separation_pct.abs() / FULL_SEPARATION_PCT);
        let alignment = unit(trend.aligned_candles as f64 / FULL_ALIGNMENT_BARS);
        let adx = match trend.adx {
            Some(adx) => unit((adx - 20.0) / 20.0),
            None => 0.5,
        };
        let trend_points = w.trend * (0.5 * separation + alignment / 6.0 + adx / 3.0);

        let pattern_base = match candidate.pattern.kind() {
            PatternKind::StructureBreak => 0.4,
            PatternKind::Pullback => 0.32,
        };
        let pattern_points =
            w.pattern * (pattern_base + 0.6 * unit(candidate.volume_ratio - 1.0));

        let rsi_points = match report.rsi {
            Some(rsi) => {
                let (min, max) = report.rsi_band;
                let centre = (min + max) / 2.0;
                let half_width = (max - min) / 2.0;
                if half_width > 0.0 {
                    w.rsi * unit(1.0 - (rsi - centre).abs() / half_width)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let candle_points = w.candle
            * (0.5 * unit(candidate.body_ratio) + 0.5 * unit(1.0 - candidate.wick_ratio));

        let context_points = match report.context_tally() {
            (_, 0) => w.context * 0.5,
            (passed, enabled) => w.context * passed as f64 / enabled as f64,
        };

        ScoreComponents {
            trend: trend_points,
            pattern: pattern_points,
            rsi: rsi_points,
            candle: candle_points,
            context: context_points,
        }
    }

    /// Score the setup and, when it clears the threshold, compute its levels
    pub fn evaluate(
        &self,
        trend: &TrendState,
        candidate: &EntrySignalCandidate,
        report: &FilterReport,
        ltf_candles: &[Candle],
    ) -> Result<ScoredSetup, ScoreRejection> {
        let components = self.components(trend, candidate, report);
        let score = ((components.total().clamp(0.0, 10.0)) * 10.0).round() / 10.0;

        debug!("Confluence {:.1}/10 ({})", score, components);

        if score < self.config.min_score {
            return Err(ScoreRejection::BelowThreshold {
                score,
                min_score: self.config.min_score,
            });
        }

        let entry = candidate.trigger_price;
        let distance = self
            .config
            .stop_rule
            .distance(entry, ltf_candles)
            .ok_or(ScoreRejection::InvalidStop)?;

        let sign = candidate.direction.sign();
        let rr = self.config.min_risk_reward;
        let stop_price = entry - sign * distance;
        let target_price = entry + sign * rr * distance;
        let extra_targets = self
            .config
            .extra_target_multiples
            .iter()
            .map(|multiple| entry + sign * multiple * distance)
            .collect();

        let mut reasons = vec![trend.describe(), candidate.describe()];
        reasons.extend(report.reasons());
        reasons.push(format!("Confluence {:.1}/10 ({})", score, components));

        Ok(ScoredSetup {
            direction: candidate.direction,
            pattern: candidate.pattern.kind(),
            score,
            components,
            reasons,
            entry_price: entry,
            stop_price,
            target_price,
            extra_targets,
            risk_reward_ratio: rr,
        })
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

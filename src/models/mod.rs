use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// OHLCV candlestick for one instrument and timeframe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub instrument: String,
    pub timestamp: DateTime<Utc>, // Bar open time
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Body as a fraction of the full high-low range (0 for a zero-range bar)
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range > 0.0 {
            self.body() / range
        } else {
            0.0
        }
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Wick opposing a trade in `direction`, as a fraction of the body
    ///
    /// Bullish trades care about the lower wick (rejection from below),
    /// bearish trades about the upper wick.
    pub fn opposing_wick_ratio(&self, direction: Direction) -> f64 {
        let body = self.body();
        if body <= 0.0 {
            return f64::INFINITY;
        }
        let wick = match direction {
            Direction::Bullish => self.lower_wick(),
            Direction::Bearish => self.upper_wick(),
        };
        wick / body
    }

    /// Whether the body points in `direction`
    pub fn closes_in(&self, direction: Direction) -> bool {
        match direction {
            Direction::Bullish => self.close > self.open,
            Direction::Bearish => self.close < self.open,
        }
    }
}

/// Candle timeframe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade direction of a setup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// +1 for bullish, -1 for bearish; used to orient price offsets
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }

    pub fn option_type(&self) -> OptionType {
        match self {
            Direction::Bullish => OptionType::Call,
            Direction::Bearish => OptionType::Put,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => f.write_str("bullish"),
            Direction::Bearish => f.write_str("bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// NSE suffix used in option symbols
    pub fn nse_suffix(&self) -> &'static str {
        match self {
            OptionType::Call => "CE",
            OptionType::Put => "PE",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => f.write_str("CALL"),
            OptionType::Put => f.write_str("PUT"),
        }
    }
}

/// Entry pattern that triggered a signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatternKind {
    Pullback,
    StructureBreak,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Pullback => f.write_str("EMA pullback"),
            PatternKind::StructureBreak => f.write_str("structure break"),
        }
    }
}

/// Outcome of a manually executed trade, reported back by the trade tracker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeOutcome {
    Win,
    Loss,
}

/// Option contract the signal refers to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractDescriptor {
    pub underlying: String,
    pub strike: u32,
    pub option_type: OptionType,
    pub expiry: NaiveDate,
    pub symbol: String, // e.g. NIFTY24JAN22500CE
}

/// Position size in whole lots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionSize {
    pub lots: u32,
    pub quantity: u32, // lots * lot_size
}

/// Trading signal handed to delivery; never mutated after creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    pub contract: ContractDescriptor,
    pub pattern: PatternKind,
    pub entry: f64,
    pub stop_loss: f64,
    pub targets: Vec<f64>, // targets[0] is the minimum risk:reward target
    pub position: PositionSize,
    pub risk_amount: f64,
    pub risk_reward_ratio: f64,
    pub confluence_score: f64,
    pub reasons: Vec<String>,
    pub trigger_time: DateTime<Utc>, // Open time of the LTF trigger candle
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn option_type(&self) -> OptionType {
        self.direction.option_type()
    }

    pub fn primary_target(&self) -> Option<f64> {
        self.targets.first().copied()
    }
}

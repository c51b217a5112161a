//! Application configuration: defaults, optional TOML file, `TRENDSIGNAL__*`
//! environment overrides and validation.

use crate::instruments::{InstrumentCatalog, InstrumentSpec};
use crate::models::Timeframe;
use crate::risk::RiskConfig;
use crate::strategy::{EntryConfig, FilterConfig, ScoringConfig, StopRule, TrendFilterConfig};
use crate::EngineError;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

const ENV_PREFIX: &str = "TRENDSIGNAL";
const DEFAULT_CONFIG_FILE: &str = "trendsignal";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeframeConfig {
    pub htf: Timeframe,
    pub ltf: Timeframe,
}

impl Default for TimeframeConfig {
    fn default() -> Self {
        Self {
            htf: Timeframe::H1,
            ltf: Timeframe::M5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub scan_interval_secs: u64,
    pub rollover_time: NaiveTime, // Exchange local time
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            rollover_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            utc_offset_minutes: 330,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub instruments: Vec<InstrumentSpec>,
    pub timeframes: TimeframeConfig,
    pub trend: TrendFilterConfig,
    pub entry: EntryConfig,
    pub filters: FilterConfig,
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
    pub schedule: ScheduleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instruments: InstrumentCatalog::default().specs().to_vec(),
            timeframes: TimeframeConfig::default(),
            trend: TrendFilterConfig::default(),
            entry: EntryConfig::default(),
            filters: FilterConfig::default(),
            scoring: ScoringConfig::default(),
            risk: RiskConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (or `./trendsignal.toml` when present) and the
    /// environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn catalog(&self) -> InstrumentCatalog {
        InstrumentCatalog::new(self.instruments.clone())
    }

    pub fn instrument_names(&self) -> Vec<String> {
        self.instruments.iter().map(|s| s.name.clone()).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_instruments()?;
        self.validate_strategy()?;
        self.validate_scoring()?;
        self.validate_risk()?;

        if self.schedule.scan_interval_secs == 0 {
            return invalid("schedule.scan_interval_secs must be positive");
        }
        if self.schedule.utc_offset_minutes.abs() >= 24 * 60 {
            return invalid("schedule.utc_offset_minutes out of range");
        }
        // The session window and the scan clock must agree on local time
        if self.filters.utc_offset_minutes != self.schedule.utc_offset_minutes {
            return invalid(format!(
                "filters.utc_offset_minutes ({}) differs from schedule.utc_offset_minutes ({})",
                self.filters.utc_offset_minutes, self.schedule.utc_offset_minutes
            ));
        }
        Ok(())
    }

    fn validate_instruments(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return invalid("at least one instrument is required");
        }

        let mut seen = HashSet::new();
        for spec in &self.instruments {
            if spec.lot_size == 0 || spec.strike_gap == 0 {
                return invalid(format!("{}: lot_size and strike_gap must be positive", spec.name));
            }
            if !seen.insert(spec.name.to_uppercase()) {
                return invalid(format!("duplicate instrument {}", spec.name));
            }
        }

        if self.timeframes.htf.duration() <= self.timeframes.ltf.duration() {
            return invalid(format!(
                "higher timeframe {} must be longer than lower timeframe {}",
                self.timeframes.htf, self.timeframes.ltf
            ));
        }
        Ok(())
    }

    fn validate_strategy(&self) -> Result<(), ConfigError> {
        let trend = &self.trend;
        if trend.fast_period == 0 || trend.fast_period >= trend.slow_period {
            return invalid("trend.fast_period must be positive and below trend.slow_period");
        }
        if trend.min_separation_pct < 0.0 || trend.alignment_candles == 0 {
            return invalid("trend.min_separation_pct must be >= 0 and alignment_candles >= 1");
        }
        if trend.adx_enabled && trend.adx_period == 0 {
            return invalid("trend.adx_period must be positive");
        }

        let entry = &self.entry;
        if entry.ema_period == 0
            || entry.volume_lookback == 0
            || entry.structure_lookback == 0
            || entry.pullback_window == 0
        {
            return invalid("entry periods and lookbacks must be positive");
        }

        let f = &self.filters;
        if f.rsi_period == 0 {
            return invalid("filters.rsi_period must be positive");
        }
        for (name, min, max) in [
            ("bullish", f.bullish_rsi_min, f.bullish_rsi_max),
            ("bearish", f.bearish_rsi_min, f.bearish_rsi_max),
        ] {
            if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) || min >= max {
                return invalid(format!("filters: {} RSI band {}-{} is inverted or out of range", name, min, max));
            }
        }
        if !(0.0..=1.0).contains(&f.min_body_ratio) || f.max_wick_ratio < 0.0 {
            return invalid("filters: candle ratios out of range");
        }
        if f.session_end <= f.window_start() {
            return invalid("filters.session_end must be after session_start plus settle_minutes");
        }
        if f.utc_offset_minutes.abs() >= 24 * 60 {
            return invalid("filters.utc_offset_minutes out of range");
        }
        Ok(())
    }

    fn validate_scoring(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        if (s.weights.total() - 10.0).abs() > 1e-6 {
            return invalid(format!("scoring weights sum to {} instead of 10", s.weights.total()));
        }
        if !(0.0..=10.0).contains(&s.min_score) {
            return invalid("scoring.min_score must be within 0-10");
        }
        if s.min_risk_reward <= 0.0 {
            return invalid("scoring.min_risk_reward must be positive");
        }
        if s.extra_target_multiples.iter().any(|m| *m <= s.min_risk_reward) {
            return invalid("scoring.extra_target_multiples must exceed min_risk_reward");
        }
        match s.stop_rule {
            StopRule::Percent { pct } if !pct.is_finite() || pct <= 0.0 || pct >= 100.0 => {
                invalid("stop_rule.pct must be within (0, 100)")
            }
            StopRule::Atr { period, multiplier } if period == 0 || multiplier <= 0.0 => {
                invalid("stop_rule ATR period and multiplier must be positive")
            }
            _ => Ok(()),
        }
    }

    fn validate_risk(&self) -> Result<(), ConfigError> {
        let limits = &self.risk.limits;
        if limits.daily_max_signals == 0 || limits.max_consecutive_losses == 0 {
            return invalid("risk limits must be at least 1");
        }

        let sizing = &self.risk.sizing;
        if sizing.total_capital <= 0.0 {
            return invalid("risk.sizing.total_capital must be positive");
        }
        if sizing.risk_per_trade <= 0.0 || sizing.risk_per_trade > 1.0 {
            return invalid("risk.sizing.risk_per_trade must be a fraction in (0, 1]");
        }
        if sizing.max_lots == 0 {
            return invalid("risk.sizing.max_lots must be at least 1");
        }
        for spec in &self.instruments {
            if u64::from(sizing.max_lots) * u64::from(spec.lot_size) > u64::from(u32::MAX) {
                return invalid(format!(
                    "risk.sizing.max_lots {} times {} lot size {} exceeds the quantity range",
                    sizing.max_lots, spec.name, spec.lot_size
                ));
            }
        }
        Ok(())
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

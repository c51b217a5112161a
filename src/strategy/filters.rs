use super::ltf_entry::EntrySignalCandidate;
use crate::indicators::{calculate_rsi, returns_correlation};
use crate::models::{Candle, Direction};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Configuration for the quality gates applied to an entry candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub rsi_period: usize,
    pub bullish_rsi_min: f64,
    pub bullish_rsi_max: f64,
    pub bearish_rsi_min: f64,
    pub bearish_rsi_max: f64,

    pub min_body_ratio: f64,
    pub max_wick_ratio: f64, // Opposing wick as a multiple of the body

    pub utc_offset_minutes: i32, // Exchange local time; IST is +330
    pub session_start: NaiveTime,
    pub settle_minutes: i64, // Skip the opening auction noise
    pub session_end: NaiveTime,

    // Market-context filters, off unless the data collaborator supplies inputs
    pub funding_enabled: bool,
    pub funding_extreme: f64,
    pub open_interest_enabled: bool,
    pub min_oi_change_pct: f64,
    pub liquidations_enabled: bool,
    pub max_liquidations: u32,
    pub correlation_enabled: bool,
    pub max_correlation: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            bullish_rsi_min: 45.0,
            bullish_rsi_max: 60.0,
            bearish_rsi_min: 40.0,
            bearish_rsi_max: 55.0,
            min_body_ratio: 0.6,
            max_wick_ratio: 0.3,
            utc_offset_minutes: 330,
            session_start: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            settle_minutes: 5,
            session_end: NaiveTime::from_hms_opt(11, 30, 0).unwrap_or_default(),
            funding_enabled: false,
            funding_extreme: 0.001,
            open_interest_enabled: false,
            min_oi_change_pct: 5.0,
            liquidations_enabled: false,
            max_liquidations: 10,
            correlation_enabled: false,
            max_correlation: 0.8,
        }
    }
}

impl FilterConfig {
    /// Inclusive RSI band for a trade in `direction`
    pub fn rsi_band(&self, direction: Direction) -> (f64, f64) {
        match direction {
            Direction::Bullish => (self.bullish_rsi_min, self.bullish_rsi_max),
            Direction::Bearish => (self.bearish_rsi_min, self.bearish_rsi_max),
        }
    }

    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// First local time at which signals may be generated
    pub fn window_start(&self) -> NaiveTime {
        self.session_start + Duration::minutes(self.settle_minutes)
    }

    pub fn context_filters_enabled(&self) -> usize {
        [
            self.funding_enabled,
            self.open_interest_enabled,
            self.liquidations_enabled,
            self.correlation_enabled,
        ]
        .iter()
        .filter(|enabled| **enabled)
        .count()
    }
}

/// Market inputs beyond candles, supplied per instrument by the data source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketContext {
    pub funding_rate: Option<f64>,
    pub open_interest_change_pct: Option<f64>,
    pub recent_liquidations: Option<u32>, // Count over the last hour
    pub reference_closes: Option<Vec<f64>>, // Closes of a correlated instrument, same timeframe
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    Rsi,
    CandleQuality,
    TimeWindow,
    Funding,
    OpenInterest,
    Liquidations,
    Correlation,
}

impl FilterKind {
    pub fn is_context(&self) -> bool {
        matches!(
            self,
            FilterKind::Funding
                | FilterKind::OpenInterest
                | FilterKind::Liquidations
                | FilterKind::Correlation
        )
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterKind::Rsi => "RSI",
            FilterKind::CandleQuality => "candle quality",
            FilterKind::TimeWindow => "time window",
            FilterKind::Funding => "funding",
            FilterKind::OpenInterest => "open interest",
            FilterKind::Liquidations => "liquidations",
            FilterKind::Correlation => "correlation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub kind: FilterKind,
    pub passed: bool,
    pub reason: String,
}

impl FilterResult {
    fn pass(kind: FilterKind, reason: String) -> Self {
        Self {
            kind,
            passed: true,
            reason,
        }
    }

    fn fail(kind: FilterKind, reason: String) -> Self {
        Self {
            kind,
            passed: false,
            reason,
        }
    }
}

/// Results of every enabled filter for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct FilterReport {
    pub results: Vec<FilterResult>,
    pub rsi: Option<f64>,
    pub rsi_band: (f64, f64),
}

impl FilterReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FilterResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn reasons(&self) -> Vec<String> {
        self.results.iter().map(|r| r.reason.clone()).collect()
    }

    /// (passed, enabled) counts over the market-context filters
    pub fn context_tally(&self) -> (usize, usize) {
        let context: Vec<&FilterResult> =
            self.results.iter().filter(|r| r.kind.is_context()).collect();
        (context.iter().filter(|r| r.passed).count(), context.len())
    }
}

/// Runs every enabled quality filter; all of them must pass
#[derive(Debug, Clone)]
pub struct QualityFilters {
    config: FilterConfig,
}

impl QualityFilters {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate all filters. Every filter runs even after a failure so the
    /// report carries the full rationale.
    pub fn evaluate(
        &self,
        candidate: &EntrySignalCandidate,
        candles: &[Candle],
        now: DateTime<FixedOffset>,
        context: &MarketContext,
    ) -> FilterReport {
        let upto = (candidate.trigger_candle_index + 1).min(candles.len());
        let closes: Vec<f64> = candles[..upto].iter().map(|c| c.close).collect();
        let rsi = calculate_rsi(&closes, self.config.rsi_period);
        let rsi_band = self.config.rsi_band(candidate.direction);

        let mut results = vec![
            self.check_rsi(rsi, rsi_band),
            self.check_candle(candidate, candles.get(candidate.trigger_candle_index)),
            self.check_time(now),
        ];

        if self.config.funding_enabled {
            results.push(self.check_funding(candidate.direction, context.funding_rate));
        }
        if self.config.open_interest_enabled {
            results.push(self.check_open_interest(context.open_interest_change_pct));
        }
        if self.config.liquidations_enabled {
            results.push(self.check_liquidations(context.recent_liquidations));
        }
        if self.config.correlation_enabled {
            results.push(self.check_correlation(&closes, context.reference_closes.as_deref()));
        }

        for result in &results {
            debug!(
                "Filter {}: {} ({})",
                result.kind,
                if result.passed { "pass" } else { "FAIL" },
                result.reason
            );
        }

        FilterReport {
            results,
            rsi,
            rsi_band,
        }
    }

    fn check_rsi(&self, rsi: Option<f64>, (min, max): (f64, f64)) -> FilterResult {
        match rsi {
            Some(value) if (min..=max).contains(&value) => FilterResult::pass(
                FilterKind::Rsi,
                format!("RSI {:.1} inside {:.0}-{:.0}", value, min, max),
            ),
            Some(value) => FilterResult::fail(
                FilterKind::Rsi,
                format!("RSI out of band: {:.1} not in {:.0}-{:.0}", value, min, max),
            ),
            None => FilterResult::fail(
                FilterKind::Rsi,
                "RSI out of band: not enough history".to_string(),
            ),
        }
    }

    fn check_candle(&self, candidate: &EntrySignalCandidate, trigger: Option<&Candle>) -> FilterResult {
        let Some(trigger) = trigger else {
            return FilterResult::fail(FilterKind::CandleQuality, "trigger candle missing".to_string());
        };
        if trigger.range() <= 0.0 {
            return FilterResult::fail(FilterKind::CandleQuality, "zero-range candle".to_string());
        }

        let body_ratio = trigger.body_ratio();
        let wick_ratio = trigger.opposing_wick_ratio(candidate.direction);

        if body_ratio < self.config.min_body_ratio {
            FilterResult::fail(
                FilterKind::CandleQuality,
                format!(
                    "weak candle body: {:.0}% of range (min {:.0}%)",
                    body_ratio * 100.0,
                    self.config.min_body_ratio * 100.0
                ),
            )
        } else if wick_ratio > self.config.max_wick_ratio {
            FilterResult::fail(
                FilterKind::CandleQuality,
                format!(
                    "opposing wick {:.0}% of body (max {:.0}%)",
                    wick_ratio * 100.0,
                    self.config.max_wick_ratio * 100.0
                ),
            )
        } else {
            FilterResult::pass(
                FilterKind::CandleQuality,
                format!(
                    "strong candle: body {:.0}% of range, wick {:.0}% of body",
                    body_ratio * 100.0,
                    wick_ratio * 100.0
                ),
            )
        }
    }

    fn check_time(&self, now: DateTime<FixedOffset>) -> FilterResult {
        let local = now.with_timezone(&self.config.local_offset());
        let weekday = local.weekday();
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return FilterResult::fail(
                FilterKind::TimeWindow,
                format!("market closed on {}", weekday),
            );
        }

        let time = local.time();
        let start = self.config.window_start();
        let end = self.config.session_end;
        if time >= start && time <= end {
            FilterResult::pass(
                FilterKind::TimeWindow,
                format!("{} inside {}-{}", time.format("%H:%M"), start.format("%H:%M"), end.format("%H:%M")),
            )
        } else {
            FilterResult::fail(
                FilterKind::TimeWindow,
                format!("outside trading window: {} not in {}-{}", time.format("%H:%M"), start.format("%H:%M"), end.format("%H:%M")),
            )
        }
    }

    fn check_funding(&self, direction: Direction, rate: Option<f64>) -> FilterResult {
        let Some(rate) = rate.filter(|r| r.is_finite()) else {
            return FilterResult::fail(FilterKind::Funding, "funding rate unavailable".to_string());
        };

        if rate.abs() <= self.config.funding_extreme {
            return FilterResult::pass(FilterKind::Funding, format!("funding {:.4}% neutral", rate * 100.0));
        }

        // Crowded positioning is only acceptable when trading against the crowd
        let contrarian = (rate > 0.0 && direction == Direction::Bearish)
            || (rate < 0.0 && direction == Direction::Bullish);
        if contrarian {
            FilterResult::pass(
                FilterKind::Funding,
                format!("extreme funding {:.4}% favours {} side", rate * 100.0, direction),
            )
        } else {
            FilterResult::fail(
                FilterKind::Funding,
                format!("extreme funding {:.4}% against {} trade", rate * 100.0, direction),
            )
        }
    }

    fn check_open_interest(&self, change_pct: Option<f64>) -> FilterResult {
        match change_pct.filter(|c| c.is_finite()) {
            Some(change) if change >= self.config.min_oi_change_pct => FilterResult::pass(
                FilterKind::OpenInterest,
                format!("open interest {:+.1}%", change),
            ),
            Some(change) => FilterResult::fail(
                FilterKind::OpenInterest,
                format!(
                    "open interest change {:+.1}% below {:.1}%",
                    change, self.config.min_oi_change_pct
                ),
            ),
            None => FilterResult::fail(
                FilterKind::OpenInterest,
                "open interest unavailable".to_string(),
            ),
        }
    }

    fn check_liquidations(&self, count: Option<u32>) -> FilterResult {
        match count {
            Some(count) if count > self.config.max_liquidations => FilterResult::fail(
                FilterKind::Liquidations,
                format!("{} liquidations in the last hour", count),
            ),
            Some(count) => FilterResult::pass(
                FilterKind::Liquidations,
                format!("{} liquidations in the last hour", count),
            ),
            None => FilterResult::fail(
                FilterKind::Liquidations,
                "liquidation data unavailable".to_string(),
            ),
        }
    }

    fn check_correlation(&self, closes: &[f64], reference: Option<&[f64]>) -> FilterResult {
        let Some(reference) = reference else {
            return FilterResult::fail(
                FilterKind::Correlation,
                "reference series unavailable".to_string(),
            );
        };
        match returns_correlation(closes, reference) {
            Some(corr) if corr.abs() > self.config.max_correlation => FilterResult::fail(
                FilterKind::Correlation,
                format!("correlation {:.2} duplicates existing exposure", corr),
            ),
            Some(corr) => FilterResult::pass(
                FilterKind::Correlation,
                format!("correlation {:.2}", corr),
            ),
            None => FilterResult::fail(
                FilterKind::Correlation,
                "correlation undefined".to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ltf_entry::EntryPattern;
    use chrono::{TimeZone, Utc};

    /// Bullish zig-zag: +1.0 trend candles, -`pullback` counter candles whose
    /// lows reach `dip` below their close
    fn create_test_candles(count: usize, pullback: f64, dip: f64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let mut prev = 22_000.0;
        (0..count)
            .map(|i| {
                let open = prev;
                let (close, high, low) = if i % 2 == 1 {
                    (open + 1.0, open + 1.05, open - 0.05)
                } else {
                    (open - pullback, open + 0.05, open - pullback - dip)
                };
                prev = close;
                Candle {
                    instrument: "NIFTY".to_string(),
                    timestamp: base + chrono::Duration::minutes(5 * i as i64),
                    open,
                    high,
                    low,
                    close,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn candidate_for(candles: &[Candle], direction: Direction) -> EntrySignalCandidate {
        let trigger = candles.last().unwrap();
        EntrySignalCandidate {
            pattern: EntryPattern::Pullback {
                ema_level: trigger.close - 1.0,
                touch_index: candles.len() - 2,
            },
            direction,
            trigger_candle_index: candles.len() - 1,
            trigger_price: trigger.close,
            volume_ratio: 1.3,
            body_ratio: trigger.body_ratio(),
            wick_ratio: trigger.opposing_wick_ratio(direction),
        }
    }

    fn ist(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    fn monday_morning() -> DateTime<FixedOffset> {
        ist(2024, 1, 15, 10, 0)
    }

    #[test]
    fn test_all_core_filters_pass() {
        let filters = QualityFilters::new(FilterConfig::default());
        let candles = create_test_candles(60, 0.8, 0.3);
        let candidate = candidate_for(&candles, Direction::Bullish);

        let report = filters.evaluate(&candidate, &candles, monday_morning(), &MarketContext::default());
        assert!(report.passed(), "{:?}", report.reasons());
        assert_eq!(report.results.len(), 3);
        assert!((report.rsi.unwrap() - 57.44).abs() < 0.01);
        assert_eq!(report.rsi_band, (45.0, 60.0));
        assert_eq!(report.context_tally(), (0, 0));
    }

    #[test]
    fn test_rsi_out_of_band_still_runs_every_filter() {
        let filters = QualityFilters::new(FilterConfig::default());
        // Shallow pullbacks push RSI well above 60
        let candles = create_test_candles(60, 0.3, 5.0);
        let candidate = candidate_for(&candles, Direction::Bullish);

        let report = filters.evaluate(&candidate, &candles, monday_morning(), &MarketContext::default());
        assert!(!report.passed());
        assert_eq!(report.results.len(), 3);
        assert!(report.rsi.unwrap() > 70.0);

        let failures: Vec<&FilterResult> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FilterKind::Rsi);
        assert!(failures[0].reason.contains("RSI out of band"));
    }

    #[test]
    fn test_bearish_rsi_band() {
        let filters = QualityFilters::new(FilterConfig::default());
        assert!(filters.check_rsi(Some(42.0), filters.config().rsi_band(Direction::Bearish)).passed);
        assert!(!filters.check_rsi(Some(57.0), filters.config().rsi_band(Direction::Bearish)).passed);
        // Band edges are inclusive
        assert!(filters.check_rsi(Some(55.0), (40.0, 55.0)).passed);
        assert!(!filters.check_rsi(None, (40.0, 55.0)).passed);
    }

    #[test]
    fn test_candle_quality() {
        let filters = QualityFilters::new(FilterConfig::default());
        let mut candles = create_test_candles(30, 0.8, 0.3);
        let last = candles.len() - 1;

        // Long lower wick on a bullish trigger: body 1.0, wick 0.5
        candles[last].low = candles[last].open - 0.5;
        let candidate = candidate_for(&candles, Direction::Bullish);
        let result = filters.check_candle(&candidate, candles.last());
        assert!(!result.passed);
        assert!(result.reason.contains("opposing wick"));

        // Small body inside a wide range
        candles[last].low = candles[last].open - 0.05;
        candles[last].high = candles[last].close + 2.0;
        let result = filters.check_candle(&candidate, candles.last());
        assert!(!result.passed);
        assert!(result.reason.contains("weak candle body"));

        // Zero range
        let flat = Candle {
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            ..candles[last].clone()
        };
        let result = filters.check_candle(&candidate, Some(&flat));
        assert!(!result.passed);
        assert!(result.reason.contains("zero-range"));
    }

    #[test]
    fn test_time_window() {
        let filters = QualityFilters::new(FilterConfig::default());
        assert!(!filters.check_time(ist(2024, 1, 15, 9, 19)).passed);
        assert!(filters.check_time(ist(2024, 1, 15, 9, 20)).passed);
        assert!(filters.check_time(ist(2024, 1, 15, 11, 30)).passed);
        assert!(!filters.check_time(ist(2024, 1, 15, 11, 31)).passed);

        // Saturday
        let result = filters.check_time(ist(2024, 1, 20, 10, 0));
        assert!(!result.passed);
        assert!(result.reason.contains("closed"));

        // A UTC clock is converted to exchange time: 04:30Z is 10:00 IST
        let utc = Utc
            .with_ymd_and_hms(2024, 1, 15, 4, 30, 0)
            .unwrap()
            .with_timezone(&FixedOffset::east_opt(0).unwrap());
        assert!(filters.check_time(utc).passed);
    }

    #[test]
    fn test_funding_filter() {
        let filters = QualityFilters::new(FilterConfig::default());
        assert!(filters.check_funding(Direction::Bullish, Some(0.0005)).passed);
        assert!(!filters.check_funding(Direction::Bullish, Some(0.002)).passed);
        // Contrarian to crowded longs
        assert!(filters.check_funding(Direction::Bearish, Some(0.002)).passed);
        assert!(filters.check_funding(Direction::Bullish, Some(-0.002)).passed);
        assert!(!filters.check_funding(Direction::Bullish, None).passed);
    }

    #[test]
    fn test_open_interest_and_liquidations() {
        let filters = QualityFilters::new(FilterConfig::default());
        assert!(filters.check_open_interest(Some(6.0)).passed);
        assert!(!filters.check_open_interest(Some(2.0)).passed);
        assert!(!filters.check_open_interest(None).passed);

        assert!(filters.check_liquidations(Some(10)).passed);
        assert!(!filters.check_liquidations(Some(11)).passed);
        assert!(!filters.check_liquidations(None).passed);
    }

    #[test]
    fn test_correlation_filter() {
        let filters = QualityFilters::new(FilterConfig::default());
        let closes = vec![100.0, 102.0, 101.0, 104.0, 103.0, 107.0];
        let twin: Vec<f64> = closes.iter().map(|c| c * 2.0).collect();
        let unrelated = vec![50.0, 50.5, 51.0, 50.0, 50.5, 51.0];

        let result = filters.check_correlation(&closes, Some(&twin));
        assert!(!result.passed);
        assert!(result.reason.contains("duplicates"));
        assert!(filters.check_correlation(&closes, Some(&unrelated)).passed);
        assert!(!filters.check_correlation(&closes, None).passed);
    }

    #[test]
    fn test_enabled_context_filters_fail_closed() {
        let config = FilterConfig {
            funding_enabled: true,
            open_interest_enabled: true,
            ..Default::default()
        };
        assert_eq!(config.context_filters_enabled(), 2);

        let filters = QualityFilters::new(config);
        let candles = create_test_candles(60, 0.8, 0.3);
        let candidate = candidate_for(&candles, Direction::Bullish);

        let context = MarketContext {
            funding_rate: Some(0.0001),
            ..Default::default()
        };
        let report = filters.evaluate(&candidate, &candles, monday_morning(), &context);
        assert_eq!(report.results.len(), 5);
        assert_eq!(report.context_tally(), (1, 2));
        assert!(!report.passed());
    }
}

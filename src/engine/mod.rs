// Signal orchestration: runs one instrument through every gate
pub mod scanner;

pub use scanner::{Clock, ManualClock, Scanner, SystemClock, TickReport};

use crate::config::AppConfig;
use crate::data::{Series, SeriesSource};
use crate::instruments::InstrumentCatalog;
use crate::models::{Signal, Timeframe};
use crate::risk::{CircuitBreakers, PositionSizer, RiskState};
use crate::strategy::{
    ConfluenceScorer, EntryDetector, MarketContext, QualityFilters, TrendFilter,
};
use crate::EngineError;
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Pipeline stage at which an instrument was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RiskGate,
    Data,
    Trend,
    Entry,
    Quality,
    Confluence,
    Sizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::RiskGate => "risk gate",
            Stage::Data => "data",
            Stage::Trend => "trend",
            Stage::Entry => "entry",
            Stage::Quality => "quality",
            Stage::Confluence => "confluence",
            Stage::Sizing => "sizing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub instrument: String,
    pub stage: Stage,
    pub reasons: Vec<String>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected at {}: {}", self.instrument, self.stage, self.reasons.join("; "))
    }
}

/// Outcome of evaluating one instrument
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Signal(Box<Signal>),
    NoSignal(Rejection),
}

impl Evaluation {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Evaluation::Signal(signal) => Some(signal),
            Evaluation::NoSignal(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Evaluation::Signal(_) => None,
            Evaluation::NoSignal(rejection) => Some(rejection),
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, Evaluation::Signal(_))
    }
}

/// Composes trend, entry, quality, confluence and sizing into a signal
///
/// Evaluation is pure: it reads the risk state it is given and never
/// mutates it, so the same inputs always produce the same outcome.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    trend: TrendFilter,
    entry: EntryDetector,
    filters: QualityFilters,
    scorer: ConfluenceScorer,
    limits: CircuitBreakers,
    sizer: PositionSizer,
    catalog: InstrumentCatalog,
    htf: Timeframe,
    ltf: Timeframe,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl SignalEngine {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            trend: TrendFilter::new(config.trend.clone()),
            entry: EntryDetector::new(config.entry.clone()),
            filters: QualityFilters::new(config.filters.clone()),
            scorer: ConfluenceScorer::new(config.scoring.clone()),
            limits: config.risk.limits.clone(),
            sizer: config.risk.sizing.clone(),
            catalog: config.catalog(),
            htf: config.timeframes.htf,
            ltf: config.timeframes.ltf,
        }
    }

    pub fn htf(&self) -> Timeframe {
        self.htf
    }

    pub fn ltf(&self) -> Timeframe {
        self.ltf
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    /// Evaluate one instrument at local time `now`
    pub fn evaluate(
        &self,
        instrument: &str,
        htf: &Series,
        ltf: &Series,
        context: &MarketContext,
        risk: &RiskState,
        now: DateTime<FixedOffset>,
    ) -> Evaluation {
        let reject = |stage: Stage, reasons: Vec<String>| {
            let rejection = Rejection {
                instrument: instrument.to_string(),
                stage,
                reasons,
            };
            debug!("{}", rejection);
            Evaluation::NoSignal(rejection)
        };

        if let Some(rejection) = self.risk_gate(instrument, risk) {
            return Evaluation::NoSignal(rejection);
        }

        let spec = match self.catalog.get(instrument) {
            Ok(spec) => spec,
            Err(e) => return reject(Stage::Data, vec![e.to_string()]),
        };

        for (series, expected) in [(htf, self.htf), (ltf, self.ltf)] {
            if series.timeframe() != expected {
                return reject(
                    Stage::Data,
                    vec![format!("expected {} series, got {}", expected, series.timeframe())],
                );
            }
        }

        let now_utc = now.with_timezone(&Utc);
        let htf_candles = htf.closed(now_utc);
        let ltf_candles = ltf.closed(now_utc);

        // 1. Higher-timeframe trend
        let trend = match self.trend.evaluate(htf_candles) {
            Ok(trend) => trend,
            Err(e) => return reject(error_stage(&e, Stage::Trend), vec![e.to_string()]),
        };
        let Some(direction) = trend.direction.as_direction() else {
            return reject(Stage::Trend, vec![trend.describe()]);
        };

        // 2. Lower-timeframe entry
        let candidate = match self.entry.detect(ltf_candles, trend.direction) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                return reject(
                    Stage::Entry,
                    vec![format!("no {} entry pattern on {}", direction, self.ltf)],
                )
            }
            Err(e) => return reject(error_stage(&e, Stage::Entry), vec![e.to_string()]),
        };

        // 3. Quality gates
        let report = self.filters.evaluate(&candidate, ltf_candles, now, context);
        if !report.passed() {
            let reasons = report.failures().map(|r| r.reason.clone()).collect();
            return reject(Stage::Quality, reasons);
        }

        // 4. Confluence score and price levels
        let setup = match self.scorer.evaluate(&trend, &candidate, &report, ltf_candles) {
            Ok(setup) => setup,
            Err(rejection) => return reject(Stage::Confluence, vec![rejection.to_string()]),
        };

        // 5. Position size
        let sizing = match self.sizer.size(setup.entry_price, setup.stop_price, spec.lot_size) {
            Ok(sizing) => sizing,
            Err(e) => return reject(Stage::Sizing, vec![e.to_string()]),
        };

        let signal = Signal {
            id: Uuid::new_v4(),
            instrument: spec.name.clone(),
            direction,
            contract: spec.contract(direction, setup.entry_price, now.naive_local()),
            pattern: setup.pattern,
            entry: setup.entry_price,
            stop_loss: setup.stop_price,
            targets: setup.targets(),
            position: sizing.position,
            risk_amount: sizing.risk_amount,
            risk_reward_ratio: setup.risk_reward_ratio,
            confluence_score: setup.score,
            reasons: setup.reasons,
            trigger_time: ltf_candles[candidate.trigger_candle_index].timestamp,
            generated_at: now_utc,
        };

        info!(
            "{} {} setup on {}: score {:.1}, entry {:.2}, stop {:.2}, {} lots",
            signal.instrument,
            signal.option_type(),
            signal.contract.symbol,
            signal.confluence_score,
            signal.entry,
            signal.stop_loss,
            signal.position.lots
        );

        Evaluation::Signal(Box::new(signal))
    }

    /// Pull both series and the context from `source`, then evaluate
    pub fn evaluate_source(
        &self,
        source: &dyn SeriesSource,
        instrument: &str,
        risk: &RiskState,
        now: DateTime<FixedOffset>,
    ) -> Evaluation {
        if let Some(rejection) = self.risk_gate(instrument, risk) {
            return Evaluation::NoSignal(rejection);
        }

        let series = source
            .get_series(instrument, self.htf)
            .and_then(|htf| Ok((htf, source.get_series(instrument, self.ltf)?)));

        match series {
            Ok((htf, ltf)) => {
                let context = source.market_context(instrument);
                self.evaluate(instrument, &htf, &ltf, &context, risk, now)
            }
            Err(e) => Evaluation::NoSignal(Rejection {
                instrument: instrument.to_string(),
                stage: Stage::Data,
                reasons: vec![e.to_string()],
            }),
        }
    }

    fn risk_gate(&self, instrument: &str, risk: &RiskState) -> Option<Rejection> {
        let reason = self.limits.check(risk).err()?;
        debug!("{} blocked: {}", instrument, reason);
        Some(Rejection {
            instrument: instrument.to_string(),
            stage: Stage::RiskGate,
            reasons: vec![reason.to_string()],
        })
    }
}

/// Missing history is a data problem; anything else belongs to the stage
fn error_stage(error: &EngineError, stage: Stage) -> Stage {
    if error.is_insufficient_data() {
        Stage::Data
    } else {
        stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{PauseReason, RiskStatus};
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
            .unwrap()
    }

    fn empty(timeframe: Timeframe) -> Series {
        Series::from_candles("NIFTY", timeframe, Vec::new())
    }

    fn risk() -> RiskState {
        RiskState::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
    }

    #[test]
    fn test_paused_state_rejected_at_risk_gate() {
        let engine = SignalEngine::default();
        let mut state = risk();
        state.status = RiskStatus::Paused(PauseReason::ConsecutiveLosses);

        let eval = engine.evaluate(
            "NIFTY",
            &empty(Timeframe::H1),
            &empty(Timeframe::M5),
            &MarketContext::default(),
            &state,
            now(),
        );
        let rejection = eval.rejection().unwrap();
        assert_eq!(rejection.stage, Stage::RiskGate);
        assert!(rejection.reasons[0].contains("consecutive loss"));
    }

    #[test]
    fn test_insufficient_history_is_data_stage() {
        let engine = SignalEngine::default();
        let eval = engine.evaluate(
            "NIFTY",
            &empty(Timeframe::H1),
            &empty(Timeframe::M5),
            &MarketContext::default(),
            &risk(),
            now(),
        );
        assert!(!eval.is_signal());
        assert_eq!(eval.rejection().unwrap().stage, Stage::Data);
    }

    #[test]
    fn test_unknown_instrument() {
        let engine = SignalEngine::default();
        let eval = engine.evaluate(
            "SENSEX",
            &empty(Timeframe::H1),
            &empty(Timeframe::M5),
            &MarketContext::default(),
            &risk(),
            now(),
        );
        let rejection = eval.rejection().unwrap();
        assert_eq!(rejection.stage, Stage::Data);
        assert!(rejection.reasons[0].contains("SENSEX"));
    }

    #[test]
    fn test_wrong_timeframe() {
        let engine = SignalEngine::default();
        let eval = engine.evaluate(
            "NIFTY",
            &empty(Timeframe::M15),
            &empty(Timeframe::M5),
            &MarketContext::default(),
            &risk(),
            now(),
        );
        assert!(eval.rejection().unwrap().reasons[0].contains("expected 1h"));
    }

    #[test]
    fn test_error_stage() {
        assert_eq!(
            error_stage(&EngineError::insufficient("LTF entry", 3, 24), Stage::Entry),
            Stage::Data
        );
        assert_eq!(
            error_stage(&EngineError::InvalidIndicator { name: "EMA" }, Stage::Trend),
            Stage::Trend
        );
    }
}

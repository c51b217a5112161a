use super::{Evaluation, Rejection, SignalEngine};
use crate::config::ScheduleConfig;
use crate::data::SeriesSource;
use crate::delivery::SignalSink;
use crate::models::Signal;
use crate::risk::RiskManager;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Source of the current exchange-local time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self {
            offset: FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What one scan produced
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub at: DateTime<FixedOffset>,
    pub signals: Vec<Signal>,
    pub rejections: Vec<Rejection>,
    pub suppressed: usize, // Signals refused by the risk manager at commit time
    pub duplicates: usize, // Trigger candle already signalled on an earlier tick
    pub skipped: bool,     // A previous tick was still running
}

impl TickReport {
    fn new(at: DateTime<FixedOffset>) -> Self {
        Self {
            at,
            signals: Vec::new(),
            rejections: Vec::new(),
            suppressed: 0,
            duplicates: 0,
            skipped: false,
        }
    }
}

/// Clears the in-flight flag when a tick ends, even on panic
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs the engine over every instrument and commits the results
pub struct Scanner {
    engine: SignalEngine,
    source: Arc<dyn SeriesSource>,
    risk: Arc<Mutex<RiskManager>>,
    sink: Arc<dyn SignalSink>,
    clock: Arc<dyn Clock>,
    instruments: Vec<String>,
    rollover_time: NaiveTime,
    in_flight: AtomicBool,
    last_trigger: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Scanner {
    pub fn new(
        engine: SignalEngine,
        source: Arc<dyn SeriesSource>,
        risk: Arc<Mutex<RiskManager>>,
        sink: Arc<dyn SignalSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let instruments = engine.catalog().names().map(str::to_string).collect();
        Self {
            engine,
            source,
            risk,
            sink,
            clock,
            instruments,
            rollover_time: ScheduleConfig::default().rollover_time,
            in_flight: AtomicBool::new(false),
            last_trigger: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_instruments(mut self, instruments: Vec<String>) -> Self {
        self.instruments = instruments;
        self
    }

    /// Local time at which a new trading day starts
    pub fn with_rollover_time(mut self, at: NaiveTime) -> Self {
        self.rollover_time = at;
        self
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn risk(&self) -> Arc<Mutex<RiskManager>> {
        self.risk.clone()
    }

    /// One scan over all instruments
    ///
    /// Every instrument is evaluated against the same risk snapshot; the
    /// resulting signals are then committed one at a time, so the daily cap
    /// holds even when several instruments fire on the same tick.
    pub fn run_tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::new(now);

        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("Previous scan still running, skipping tick at {}", now.format("%H:%M:%S"));
            report.skipped = true;
            return report;
        }
        let _guard = InFlight(&self.in_flight);

        let snapshot = {
            let mut risk = lock(&self.risk);
            let today = trading_date(now, self.rollover_time);
            if risk.state().trading_date < today {
                warn!(
                    "Risk state still dated {} at {}, rolling over to {}",
                    risk.state().trading_date,
                    now.format("%Y-%m-%d %H:%M"),
                    today
                );
                self.start_day(&mut risk, today);
            }
            risk.snapshot()
        };

        let mut candidates = Vec::new();
        for instrument in &self.instruments {
            match self
                .engine
                .evaluate_source(self.source.as_ref(), instrument, &snapshot, now)
            {
                Evaluation::Signal(signal) => candidates.push(*signal),
                Evaluation::NoSignal(rejection) => {
                    info!("  {} - no signal ({}): {}", instrument, rejection.stage, rejection.reasons.join("; "));
                    report.rejections.push(rejection);
                }
            }
        }

        let mut last_trigger = self.last_trigger.lock().unwrap_or_else(|e| e.into_inner());
        for signal in candidates {
            // A closed trigger candle stays the latest bar until the next one closes
            if last_trigger.get(&signal.instrument) == Some(&signal.trigger_time) {
                report.duplicates += 1;
                continue;
            }

            let emitted = lock(&self.risk).try_emit();
            match emitted {
                Ok(count) => {
                    info!(
                        "📣 Signal {} for {} ({} today)",
                        signal.contract.symbol, signal.instrument, count
                    );
                    if let Err(e) = self.sink.deliver(&signal) {
                        warn!("Failed to deliver signal {}: {}", signal.id, e);
                    }
                    last_trigger.insert(signal.instrument.clone(), signal.trigger_time);
                    report.signals.push(signal);
                }
                Err(reason) => {
                    info!("  {} - signal suppressed: {}", signal.instrument, reason);
                    report.suppressed += 1;
                }
            }
        }

        report
    }

    /// Publish the daily summary and start the new trading day
    ///
    /// A state already on the current trading day was caught up by a tick and
    /// is left alone, keeping whatever was emitted since.
    pub fn rollover(&self) {
        let today = trading_date(self.clock.now(), self.rollover_time);
        let mut risk = lock(&self.risk);
        if risk.state().trading_date >= today {
            debug!("Risk state already on {}, nothing to roll over", today);
            return;
        }
        self.start_day(&mut risk, today);
    }

    fn start_day(&self, risk: &mut RiskManager, today: NaiveDate) {
        if let Err(e) = self.sink.deliver_summary(&risk.summary()) {
            warn!("Failed to deliver daily summary: {}", e);
        }
        risk.rollover(today);
    }
}

fn lock(risk: &Mutex<RiskManager>) -> MutexGuard<'_, RiskManager> {
    risk.lock().unwrap_or_else(|e| e.into_inner())
}

/// Trading day in force at `now`; before `rollover_time` it is still the previous day
pub fn trading_date(now: DateTime<FixedOffset>, rollover_time: NaiveTime) -> NaiveDate {
    let date = now.date_naive();
    if now.time() >= rollover_time {
        date
    } else {
        date.pred_opt().unwrap_or(date)
    }
}

/// Time from `now` until the next local `at`
pub fn until_next(now: DateTime<FixedOffset>, at: NaiveTime) -> Duration {
    let today = now.date_naive().and_time(at);
    let local_now = now.naive_local();
    let next = if today > local_now {
        today
    } else {
        today + Duration::days(1)
    };
    next - local_now
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::data::CandleStore;
    use crate::delivery::{ChannelSink, Notification};
    use crate::engine::Stage;
    use crate::models::TradeOutcome;
    use crate::risk::{CircuitBreakers, RiskState};
    use chrono::{NaiveDate, TimeZone};

    fn ist(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, h, m, 0)
            .unwrap()
    }

    fn create_scanner(risk: RiskManager) -> (Scanner, Arc<ManualClock>, tokio::sync::mpsc::Receiver<Notification>) {
        let clock = Arc::new(ManualClock::new(ist(10, 0)));
        let (sink, rx) = ChannelSink::new(8);
        let scanner = Scanner::new(
            SignalEngine::from_config(&AppConfig::default()),
            Arc::new(CandleStore::new(500)),
            Arc::new(Mutex::new(risk)),
            Arc::new(sink),
            clock.clone(),
        );
        (scanner, clock, rx)
    }

    fn manager() -> RiskManager {
        RiskManager::new(
            CircuitBreakers::default(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
    }

    #[test]
    fn test_tick_isolates_missing_instruments() {
        let (scanner, _, _rx) = create_scanner(manager());
        let report = scanner.run_tick();

        assert!(!report.skipped);
        assert!(report.signals.is_empty());
        assert_eq!(report.rejections.len(), 2);
        assert!(report.rejections.iter().all(|r| r.stage == Stage::Data));
        assert_eq!(scanner.instruments(), ["NIFTY", "BANKNIFTY"]);
    }

    #[test]
    fn test_paused_manager_rejects_at_risk_gate() {
        let mut risk = manager();
        risk.record_outcome(TradeOutcome::Loss);
        risk.record_outcome(TradeOutcome::Loss);
        let (scanner, _, _rx) = create_scanner(risk);

        let report = scanner.run_tick();
        assert!(report.rejections.iter().all(|r| r.stage == Stage::RiskGate));
    }

    #[test]
    fn test_overlapping_tick_is_skipped() {
        let (scanner, _, _rx) = create_scanner(manager());
        scanner.in_flight.store(true, Ordering::Release);

        let report = scanner.run_tick();
        assert!(report.skipped);
        assert!(report.rejections.is_empty());

        scanner.in_flight.store(false, Ordering::Release);
        assert!(!scanner.run_tick().skipped);
        assert!(!scanner.in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_rollover_publishes_summary() {
        let mut risk = manager();
        risk.try_emit().unwrap();
        let (scanner, clock, mut rx) = create_scanner(risk);

        clock.set(ist(10, 0) + Duration::days(1));
        scanner.rollover();

        match rx.recv().await {
            Some(Notification::Summary(summary)) => assert_eq!(summary.signals_sent, 1),
            other => panic!("unexpected notification {:?}", other),
        }
        let state = scanner.risk().lock().unwrap().snapshot();
        assert_eq!(state, RiskState::new(NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()));
    }

    #[test]
    fn test_tick_rolls_over_stale_state() {
        let mut risk = RiskManager::new(
            CircuitBreakers::default(),
            NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
        );
        for _ in 0..3 {
            risk.try_emit().unwrap();
        }
        assert!(risk.state().is_paused());
        let (scanner, _, mut rx) = create_scanner(risk);

        let report = scanner.run_tick();

        // Evaluation reaches the (empty) store instead of the stale daily cap
        assert_eq!(report.rejections.len(), 2);
        assert!(report.rejections.iter().all(|r| r.stage == Stage::Data));

        let state = scanner.risk().lock().unwrap().snapshot();
        assert_eq!(state, RiskState::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
        match rx.try_recv() {
            Ok(Notification::Summary(summary)) => {
                assert_eq!(summary.date, NaiveDate::from_ymd_opt(2024, 1, 13).unwrap());
                assert_eq!(summary.signals_sent, 3);
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_tick_before_rollover_time_keeps_previous_day() {
        let mut risk = RiskManager::new(
            CircuitBreakers::default(),
            NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
        );
        risk.try_emit().unwrap();
        let (scanner, clock, mut rx) = create_scanner(risk);
        clock.set(ist(8, 30));

        scanner.run_tick();

        let state = scanner.risk().lock().unwrap().snapshot();
        assert_eq!(state.trading_date, NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
        assert_eq!(state.signals_sent_today, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_scheduled_rollover_after_catch_up_is_a_no_op() {
        let stale = RiskManager::new(
            CircuitBreakers::default(),
            NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
        );
        let (scanner, _, mut rx) = create_scanner(stale);
        scanner.run_tick();
        assert!(matches!(rx.try_recv(), Ok(Notification::Summary(_))));

        // A signal counted after the catch-up survives the late scheduled rollover
        scanner.risk().lock().unwrap().try_emit().unwrap();
        scanner.rollover();

        let state = scanner.risk().lock().unwrap().snapshot();
        assert_eq!(state.trading_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(state.signals_sent_today, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_trading_date() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        assert_eq!(trading_date(ist(8, 59), nine), day(14));
        assert_eq!(trading_date(ist(9, 0), nine), day(15));
        assert_eq!(trading_date(ist(15, 30), nine), day(15));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(ist(9, 0));
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), ist(10, 30));
    }

    #[test]
    fn test_until_next() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(until_next(ist(8, 30), nine), Duration::minutes(30));
        assert_eq!(until_next(ist(9, 0), nine), Duration::hours(24));
        assert_eq!(until_next(ist(10, 0), nine), Duration::hours(23));
    }

    #[test]
    fn test_system_clock_offset() {
        let clock = SystemClock::new(330);
        assert_eq!(clock.now().offset().local_minus_utc(), 330 * 60);
    }
}

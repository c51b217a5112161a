use super::circuit_breakers::{CircuitBreakers, PauseReason, RiskState, RiskStatus};
use crate::models::TradeOutcome;
use crate::{EngineError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

/// End-of-day view of the risk counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub signals_sent: u32,
    pub daily_max_signals: u32,
    pub consecutive_losses: u32,
    pub status: RiskStatus,
}

/// Single owner of the mutable risk state
#[derive(Debug, Clone)]
pub struct RiskManager {
    limits: CircuitBreakers,
    state: RiskState,
}

impl RiskManager {
    pub fn new(limits: CircuitBreakers, today: NaiveDate) -> Self {
        Self {
            limits,
            state: RiskState::new(today),
        }
    }

    /// Resume from a persisted state
    ///
    /// An inconsistent state is discarded for a fresh one; a state from an
    /// earlier day is rolled over.
    pub fn restore(limits: CircuitBreakers, state: RiskState, today: NaiveDate) -> Self {
        let mut manager = match validate_state(&limits, &state) {
            Ok(()) => Self { limits, state },
            Err(e) => {
                warn!("Discarding persisted risk state: {}", e);
                return Self::new(limits, today);
            }
        };

        if manager.state.trading_date != today {
            manager.rollover(today);
        }
        manager
    }

    pub fn restore_json(limits: CircuitBreakers, json: &str, today: NaiveDate) -> Self {
        match serde_json::from_str::<RiskState>(json) {
            Ok(state) => Self::restore(limits, state, today),
            Err(e) => {
                warn!("Discarding unreadable risk state: {}", e);
                Self::new(limits, today)
            }
        }
    }

    pub fn limits(&self) -> &CircuitBreakers {
        &self.limits
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn snapshot(&self) -> RiskState {
        self.state.clone()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.state)
    }

    pub fn check(&self) -> std::result::Result<(), PauseReason> {
        self.limits.check(&self.state)
    }

    /// Count one emitted signal; returns the new daily count
    pub fn try_emit(&mut self) -> std::result::Result<u32, PauseReason> {
        self.check()?;

        self.state.signals_sent_today += 1;
        if self.state.signals_sent_today >= self.limits.daily_max_signals {
            self.pause(PauseReason::DailyLimit);
        }
        Ok(self.state.signals_sent_today)
    }

    pub fn record_outcome(&mut self, outcome: TradeOutcome) -> &RiskState {
        match outcome {
            TradeOutcome::Win => {
                self.state.consecutive_losses = 0;
            }
            TradeOutcome::Loss => {
                self.state.consecutive_losses += 1;
                if self.state.consecutive_losses >= self.limits.max_consecutive_losses {
                    self.pause(PauseReason::ConsecutiveLosses);
                }
            }
        }
        info!(
            "Recorded {:?}: {} consecutive losses, status {:?}",
            outcome, self.state.consecutive_losses, self.state.status
        );
        &self.state
    }

    /// Start a new trading day, lifting any pause
    pub fn rollover(&mut self, date: NaiveDate) {
        info!(
            "Risk rollover {} -> {} ({} signals sent, {:?})",
            self.state.trading_date, date, self.state.signals_sent_today, self.state.status
        );
        self.state = RiskState::new(date);
    }

    pub fn summary(&self) -> DailySummary {
        DailySummary {
            date: self.state.trading_date,
            signals_sent: self.state.signals_sent_today,
            daily_max_signals: self.limits.daily_max_signals,
            consecutive_losses: self.state.consecutive_losses,
            status: self.state.status,
        }
    }

    fn pause(&mut self, reason: PauseReason) {
        // The first reason sticks
        if self.state.status == RiskStatus::Active {
            warn!("Signal emission paused: {}", reason);
            self.state.status = RiskStatus::Paused(reason);
        }
    }
}

pub fn validate_state(limits: &CircuitBreakers, state: &RiskState) -> Result<()> {
    match limits.inconsistency(state) {
        Some(problem) => Err(EngineError::StateCorruption(problem)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_daily_cap() {
        let mut manager = RiskManager::new(CircuitBreakers::default(), day(15));

        assert_eq!(manager.try_emit(), Ok(1));
        assert_eq!(manager.try_emit(), Ok(2));
        assert_eq!(manager.try_emit(), Ok(3));
        assert_eq!(
            manager.state().status,
            RiskStatus::Paused(PauseReason::DailyLimit)
        );
        assert_eq!(manager.try_emit(), Err(PauseReason::DailyLimit));
        assert_eq!(manager.state().signals_sent_today, 3);
    }

    #[test]
    fn test_consecutive_losses_pause() {
        let mut manager = RiskManager::new(CircuitBreakers::default(), day(15));

        manager.record_outcome(TradeOutcome::Loss);
        assert!(!manager.state().is_paused());
        manager.record_outcome(TradeOutcome::Loss);
        assert_eq!(
            manager.state().status,
            RiskStatus::Paused(PauseReason::ConsecutiveLosses)
        );
        assert_eq!(manager.try_emit(), Err(PauseReason::ConsecutiveLosses));
    }

    #[test]
    fn test_single_loss_threshold() {
        let limits = CircuitBreakers {
            max_consecutive_losses: 1,
            ..Default::default()
        };
        let mut manager = RiskManager::new(limits, day(15));

        manager.record_outcome(TradeOutcome::Loss);
        assert!(manager.state().is_paused());
    }

    #[test]
    fn test_win_resets_losses_but_keeps_pause() {
        let mut manager = RiskManager::new(CircuitBreakers::default(), day(15));

        manager.record_outcome(TradeOutcome::Loss);
        manager.record_outcome(TradeOutcome::Win);
        assert_eq!(manager.state().consecutive_losses, 0);
        assert!(!manager.state().is_paused());

        manager.record_outcome(TradeOutcome::Loss);
        manager.record_outcome(TradeOutcome::Loss);
        manager.record_outcome(TradeOutcome::Win);
        assert_eq!(manager.state().consecutive_losses, 0);
        assert!(manager.state().is_paused());
    }

    #[test]
    fn test_rollover_lifts_pause() {
        let mut manager = RiskManager::new(CircuitBreakers::default(), day(15));
        manager.record_outcome(TradeOutcome::Loss);
        manager.record_outcome(TradeOutcome::Loss);
        manager.try_emit().unwrap_err();

        manager.rollover(day(16));
        assert_eq!(manager.snapshot(), RiskState::new(day(16)));
        assert_eq!(manager.try_emit(), Ok(1));
    }

    #[test]
    fn test_restore_same_day() {
        let mut state = RiskState::new(day(15));
        state.signals_sent_today = 2;
        state.consecutive_losses = 1;

        let manager = RiskManager::restore(CircuitBreakers::default(), state.clone(), day(15));
        assert_eq!(manager.snapshot(), state);
    }

    #[test]
    fn test_restore_previous_day_rolls_over() {
        let mut state = RiskState::new(day(12));
        state.signals_sent_today = 3;
        state.status = RiskStatus::Paused(PauseReason::DailyLimit);

        let manager = RiskManager::restore(CircuitBreakers::default(), state, day(15));
        assert_eq!(manager.snapshot(), RiskState::new(day(15)));
    }

    #[test]
    fn test_restore_corrupt_state_resets() {
        let mut state = RiskState::new(day(15));
        state.signals_sent_today = 7;

        assert!(matches!(
            validate_state(&CircuitBreakers::default(), &state),
            Err(EngineError::StateCorruption(_))
        ));

        let manager = RiskManager::restore(CircuitBreakers::default(), state, day(15));
        assert_eq!(manager.snapshot(), RiskState::new(day(15)));
    }

    #[test]
    fn test_restore_json() {
        let mut manager = RiskManager::new(CircuitBreakers::default(), day(15));
        manager.try_emit().unwrap();
        let json = manager.to_json().unwrap();

        let restored = RiskManager::restore_json(CircuitBreakers::default(), &json, day(15));
        assert_eq!(restored.state().signals_sent_today, 1);

        let garbage = RiskManager::restore_json(CircuitBreakers::default(), "{not json", day(15));
        assert_eq!(garbage.snapshot(), RiskState::new(day(15)));
    }

    #[test]
    fn test_summary() {
        let mut manager = RiskManager::new(CircuitBreakers::default(), day(15));
        manager.try_emit().unwrap();
        manager.record_outcome(TradeOutcome::Loss);

        let summary = manager.summary();
        assert_eq!(summary.signals_sent, 1);
        assert_eq!(summary.daily_max_signals, 3);
        assert_eq!(summary.consecutive_losses, 1);
        assert_eq!(summary.status, RiskStatus::Active);
    }
}

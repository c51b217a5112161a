use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Limits that pause signal emission for the rest of the trading day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakers {
    pub daily_max_signals: u32,
    pub max_consecutive_losses: u32,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self {
            daily_max_signals: 3,      // Max 3 signals per day
            max_consecutive_losses: 2, // 2 losses in a row
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    DailyLimit,
    ConsecutiveLosses,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::DailyLimit => f.write_str("daily signal limit reached"),
            PauseReason::ConsecutiveLosses => f.write_str("consecutive loss limit reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskStatus {
    Active,
    Paused(PauseReason),
}

/// Per-day risk counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskState {
    pub trading_date: NaiveDate,
    pub signals_sent_today: u32,
    pub consecutive_losses: u32,
    pub status: RiskStatus,
}

impl RiskState {
    pub fn new(trading_date: NaiveDate) -> Self {
        Self {
            trading_date,
            signals_sent_today: 0,
            consecutive_losses: 0,
            status: RiskStatus::Active,
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.status, RiskStatus::Paused(_))
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        match self.status {
            RiskStatus::Active => None,
            RiskStatus::Paused(reason) => Some(reason),
        }
    }
}

impl CircuitBreakers {
    /// Ok when a new signal may be emitted from `state`
    pub fn check(&self, state: &RiskState) -> Result<(), PauseReason> {
        if let RiskStatus::Paused(reason) = state.status {
            return Err(reason);
        }

        // Check daily signal limit
        if state.signals_sent_today >= self.daily_max_signals {
            return Err(PauseReason::DailyLimit);
        }

        // Check consecutive losses
        if state.consecutive_losses >= self.max_consecutive_losses {
            return Err(PauseReason::ConsecutiveLosses);
        }

        Ok(())
    }

    /// Describe why `state` cannot have been produced under these limits
    pub fn inconsistency(&self, state: &RiskState) -> Option<String> {
        if state.signals_sent_today > self.daily_max_signals {
            return Some(format!(
                "{} signals sent with a daily maximum of {}",
                state.signals_sent_today, self.daily_max_signals
            ));
        }
        if state.status == RiskStatus::Active && self.check(state).is_err() {
            return Some(format!(
                "status active with {} signals and {} consecutive losses",
                state.signals_sent_today, state.consecutive_losses
            ));
        }
        None
    }
}

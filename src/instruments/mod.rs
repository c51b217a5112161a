//! Index-option contract catalogue: lot sizes, strike grids, weekly expiries
//! and NSE trading symbols.

use crate::models::{ContractDescriptor, Direction};
use crate::{EngineError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Local hour from which an expiring weekly contract is no longer offered
const EXPIRY_ROLL_HOUR: u32 = 15;

/// Contract specification of one underlying index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSpec {
    pub name: String,
    pub lot_size: u32,
    pub strike_gap: u32,
    pub expiry_weekday: Weekday,
}

impl InstrumentSpec {
    pub fn nifty() -> Self {
        Self {
            name: "NIFTY".to_string(),
            lot_size: 50,
            strike_gap: 50,
            expiry_weekday: Weekday::Thu,
        }
    }

    pub fn banknifty() -> Self {
        Self {
            name: "BANKNIFTY".to_string(),
            lot_size: 25,
            strike_gap: 100,
            expiry_weekday: Weekday::Wed,
        }
    }

    /// At-the-money strike: spot rounded to the nearest strike step
    pub fn atm_strike(&self, spot: f64) -> u32 {
        let gap = self.strike_gap.max(1) as f64;
        ((spot / gap).round() * gap).max(0.0) as u32
    }

    /// Weekly expiry that is still tradable at local time `now`
    ///
    /// On expiry day the contract rolls to next week from 15:00 onwards.
    pub fn weekly_expiry(&self, now: NaiveDateTime) -> NaiveDate {
        let today = now.date();
        let days_ahead = (self.expiry_weekday.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        if days_ahead == 0 && now.hour() >= EXPIRY_ROLL_HOUR {
            today + Duration::days(7)
        } else {
            today + Duration::days(days_ahead)
        }
    }

    /// NSE-style symbol, e.g. `NIFTY24JAN22500CE`
    pub fn option_symbol(&self, expiry: NaiveDate, strike: u32, direction: Direction) -> String {
        format!(
            "{}{}{}{}",
            self.name,
            expiry.format("%y%b").to_string().to_uppercase(),
            strike,
            direction.option_type().nse_suffix()
        )
    }

    /// ATM weekly contract for a trade in `direction`
    pub fn contract(&self, direction: Direction, spot: f64, now: NaiveDateTime) -> ContractDescriptor {
        let strike = self.atm_strike(spot);
        let expiry = self.weekly_expiry(now);
        ContractDescriptor {
            underlying: self.name.clone(),
            strike,
            option_type: direction.option_type(),
            expiry,
            symbol: self.option_symbol(expiry, strike, direction),
        }
    }
}

/// Known instruments, looked up by name
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentCatalog {
    specs: Vec<InstrumentSpec>,
}

impl InstrumentCatalog {
    pub fn new(specs: Vec<InstrumentSpec>) -> Self {
        Self { specs }
    }

    pub fn get(&self, name: &str) -> Result<&InstrumentSpec> {
        self.specs
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::UnknownInstrument(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn specs(&self) -> &[InstrumentSpec] {
        &self.specs
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        Self::new(vec![InstrumentSpec::nifty(), InstrumentSpec::banknifty()])
    }
}

use crate::models::PositionSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingError {
    #[error("Invalid stop: entry {entry}, stop {stop}")]
    InvalidStop { entry: f64, stop: f64 },

    #[error("Position too small: {units} units with lot size {lot_size}")]
    SizeTooSmall { units: u64, lot_size: u32 },

    #[error("Position too large: {lots} lots of {lot_size} exceeds the quantity range")]
    QuantityOverflow { lots: u64, lot_size: u32 },
}

/// Result of sizing one setup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    pub position: PositionSize,
    pub risk_budget: f64, // capital * risk_per_trade
    pub risk_amount: f64, // quantity * stop distance
}

/// Fixed-fractional position sizing in whole lots
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionSizer {
    pub total_capital: f64,
    pub risk_per_trade: f64, // fraction of capital, 0.01 = 1%
    pub max_lots: u32,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            total_capital: 500_000.0,
            risk_per_trade: 0.01,
            max_lots: 10,
        }
    }
}

impl PositionSizer {
    pub fn risk_budget(&self) -> f64 {
        self.total_capital * self.risk_per_trade
    }

    pub fn size(&self, entry: f64, stop: f64, lot_size: u32) -> Result<Sizing, SizingError> {
        let distance = (entry - stop).abs();
        if !distance.is_finite() || distance <= 0.0 {
            return Err(SizingError::InvalidStop { entry, stop });
        }

        let risk_budget = self.risk_budget();
        let raw_units = (risk_budget / distance).floor();
        let units = if raw_units.is_finite() && raw_units > 0.0 {
            raw_units as u64
        } else {
            0
        };

        let cap = self.max_lots as u64 * lot_size as u64;
        let units = units.min(cap);

        let lots = match lot_size {
            0 => 0,
            size => units / size as u64,
        };
        if lots < 1 {
            return Err(SizingError::SizeTooSmall { units, lot_size });
        }

        // lots <= max_lots, but lots * lot_size may not fit a u32
        let quantity = lots * lot_size as u64;
        let (lots, quantity) = match (u32::try_from(lots), u32::try_from(quantity)) {
            (Ok(lots), Ok(quantity)) => (lots, quantity),
            _ => return Err(SizingError::QuantityOverflow { lots, lot_size }),
        };
        let risk_amount = quantity as f64 * distance;

        debug!(
            "Sized {} lots ({} units) risking {:.2} of {:.2}",
            lots, quantity, risk_amount, risk_budget
        );

        Ok(Sizing {
            position: PositionSize { lots, quantity },
            risk_budget,
            risk_amount,
        })
    }
}

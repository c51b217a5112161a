// Risk management module
pub mod circuit_breakers;
pub mod manager;
pub mod position_sizer;

pub use circuit_breakers::{CircuitBreakers, PauseReason, RiskState, RiskStatus};
pub use manager::{validate_state, DailySummary, RiskManager};
pub use position_sizer::{PositionSizer, Sizing, SizingError};

use serde::{Deserialize, Serialize};

/// `[risk]` configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RiskConfig {
    pub limits: CircuitBreakers,
    pub sizing: PositionSizer,
}

use thiserror::Error;

/// Errors raised by the signal pipeline.
///
/// Everything except `Configuration` is scoped to a single instrument and a
/// single tick: the orchestrator turns it into silence for that instrument and
/// moves on to the next one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("insufficient data for {what}: have {have} candles, need {need}")]
    InsufficientData {
        what: &'static str,
        have: usize,
        need: usize,
    },

    #[error("invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: String },

    #[error("indicator {name} produced a non-finite value")]
    InvalidIndicator { name: &'static str },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("risk state corrupted: {0}")]
    StateCorruption(String),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
}

impl EngineError {
    pub fn insufficient(what: &'static str, have: usize, need: usize) -> Self {
        Self::InsufficientData { what, have, need }
    }

    /// True for errors that simply mean "not enough history yet".
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

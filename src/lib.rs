// Core modules
pub mod config;
pub mod data;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod instruments;
pub mod models;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use engine::{Evaluation, Rejection, SignalEngine};
pub use error::EngineError;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, EngineError>;

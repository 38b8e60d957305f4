//! Engine error types
//!
//! Every variant is fatal for the pipeline instance that returned it.

use contracts::ContractError;
use event_bus::BusError;
use thiserror::Error;
use tracker::TrackerError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Tracker invariant violation
    #[error("tracker: {0}")]
    Tracker(#[from] TrackerError),

    /// Publish failed (bus closed under a running engine)
    #[error("event bus: {0}")]
    Bus(#[from] BusError),

    /// Rule-level invariant violation
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl EngineError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }
}

impl From<EngineError> for ContractError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Tracker(e) => e.into(),
            EngineError::Bus(e) => e.into(),
            EngineError::Invariant(message) => ContractError::invariant(message),
        }
    }
}

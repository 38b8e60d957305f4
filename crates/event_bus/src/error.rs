//! Event bus error types

use contracts::ContractError;
use thiserror::Error;

use crate::SubscriptionId;

/// Bus-specific errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Publish after close
    #[error("event bus is closed")]
    Closed,

    /// Unsubscribe with an id the bus does not know
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Sink error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] ContractError),
}

impl BusError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<BusError> for ContractError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Closed => ContractError::BusClosed,
            BusError::Contract(inner) => inner,
            other => ContractError::Other(other.to_string()),
        }
    }
}

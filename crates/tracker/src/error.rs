//! Tracker error types
//!
//! Only internal invariant violations surface here; bad input is counted, not raised.

use contracts::{ContractError, TrackId, TrackState};
use thiserror::Error;

/// Tracker invariant violations (programming defects)
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A newly allocated id collides with a live track
    #[error("duplicate track id {0}")]
    DuplicateTrackId(TrackId),

    /// A lifecycle transition that would move backwards
    #[error("illegal transition for track {id}: {from:?} -> {to:?}")]
    IllegalTransition {
        id: TrackId,
        from: TrackState,
        to: TrackState,
    },
}

impl From<TrackerError> for ContractError {
    fn from(err: TrackerError) -> Self {
        ContractError::invariant(err.to_string())
    }
}

//! Rule output shared by the evaluators

use contracts::{DedupKey, EventPayload, SafetyEvent, Severity};

/// Candidate event produced by a rule evaluator
///
/// Already cleared by the cooldown ledger; the processor stamps it with the
/// camera and frame before publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub dedup_key: DedupKey,
    pub severity: Severity,
    pub payload: EventPayload,
}

impl Candidate {
    pub fn into_event(self, camera_id: &str, frame_index: u64, timestamp: f64) -> SafetyEvent {
        SafetyEvent::new(
            self.dedup_key,
            camera_id,
            frame_index,
            timestamp,
            self.severity,
            self.payload,
        )
    }
}

//! Emergency-priority rule

use contracts::{
    ClassConfig, DedupKey, EmergencyConfig, EventPayload, EventType, Severity, TrackSnapshot,
};
use tracing::info;

use crate::cooldown::{CooldownLedger, UNTIL_EVICTED};
use crate::rule::Candidate;

/// Raises one event per track once it is confirmed and its most recent
/// observations form a long enough streak of privileged-class readings.
#[derive(Debug, Clone)]
pub struct EmergencyRule {
    config: EmergencyConfig,
}

impl EmergencyRule {
    pub fn new(config: EmergencyConfig) -> Self {
        Self { config }
    }

    /// Trailing run of consecutive-frame observations that carry an
    /// emergency class at or above the confidence gate
    pub fn qualifying_streak(&self, track: &TrackSnapshot, classes: &ClassConfig) -> u32 {
        let mut streak = 0;
        let mut expected_frame: Option<u64> = None;

        for obs in track.history.iter().rev() {
            if expected_frame.is_some_and(|f| f != obs.frame_index) {
                break;
            }
            if !classes.is_emergency(&obs.class_label) || obs.confidence < self.config.min_confidence {
                break;
            }
            streak += 1;
            match obs.frame_index.checked_sub(1) {
                Some(prev) => expected_frame = Some(prev),
                None => break,
            }
        }
        streak
    }

    pub fn evaluate(
        &self,
        track: &TrackSnapshot,
        classes: &ClassConfig,
        ledger: &mut CooldownLedger,
    ) -> Option<Candidate> {
        if !track.is_confirmed() || !track.matched {
            return None;
        }

        let streak = self.qualifying_streak(track, classes);
        if streak < self.config.streak_frames {
            return None;
        }

        let key = DedupKey::track(track.id, EventType::EmergencyVehicle);
        if !ledger.try_acquire(key, track.frame_index, UNTIL_EVICTED) {
            return None;
        }

        let latest = track.latest();
        let class_label = latest
            .map(|obs| obs.class_label.clone())
            .unwrap_or_else(|| track.class_label.clone());
        info!(track_id = track.id, class = %class_label, streak, "Emergency vehicle");

        Some(Candidate {
            dedup_key: key,
            severity: Severity::High,
            payload: EventPayload {
                class_label,
                bbox: Some(track.bbox),
                confidence: Some(track.confidence),
                heading_deg: (track.motion.speed() > 0.0).then(|| track.motion.heading_deg()),
                streak: Some(streak),
                ..Default::default()
            },
        })
    }
}

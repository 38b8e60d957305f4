//! Live track state, owned exclusively by the tracker.

use std::collections::HashMap;
use std::fmt;

use contracts::{BBox, Detection, MotionVector, Observation, TrackId, TrackSnapshot, TrackState};
use nalgebra::Vector2;
use ringbuf::{traits::*, HeapRb};
use tracing::debug;

use crate::TrackerError;

/// A single tracked object
pub(crate) struct Track {
    pub id: TrackId,
    pub state: TrackState,
    /// Latest matched box
    pub bbox: BBox,
    /// Confidence of the latest matched detection
    pub confidence: f64,
    /// Majority class over the history ring
    pub class_label: String,
    /// Box center of the latest match
    position: Vector2<f64>,
    /// EMA of per-step displacement
    velocity: Vector2<f64>,
    /// Last K observations
    history: HeapRb<Observation>,
    pub age: u32,
    pub misses: u32,
    pub hit_streak: u32,
    /// Frames spent in Lost
    pub lost_frames: u32,
    /// Matched in the current update
    pub matched: bool,
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("class", &self.class_label)
            .field("history_len", &self.history.occupied_len())
            .field("misses", &self.misses)
            .finish()
    }
}

impl Track {
    pub fn new(id: TrackId, det: &Detection, history_len: usize) -> Self {
        let (cx, cy) = det.bbox.center();
        let mut track = Self {
            id,
            state: TrackState::Tentative,
            bbox: det.bbox,
            confidence: det.confidence,
            class_label: det.class_label.clone(),
            position: Vector2::new(cx, cy),
            velocity: Vector2::zeros(),
            history: HeapRb::new(history_len.max(1)),
            age: 0,
            misses: 0,
            hit_streak: 1,
            lost_frames: 0,
            matched: true,
        };
        track.record(det);
        track
    }

    /// Apply a matched detection: EMA motion update, history push, class re-vote
    pub fn update_with_detection(&mut self, det: &Detection, alpha: f64) {
        let (cx, cy) = det.bbox.center();
        let p_new = Vector2::new(cx, cy);

        self.velocity = alpha * (p_new - self.position) + (1.0 - alpha) * self.velocity;
        self.position = p_new;
        self.bbox = det.bbox;
        self.confidence = det.confidence;
        self.hit_streak += 1;
        self.misses = 0;
        self.matched = true;

        self.record(det);
        self.class_label = self.vote_class();
    }

    pub fn mark_missed(&mut self) {
        self.misses += 1;
        self.hit_streak = 0;
        self.matched = false;
    }

    /// Move to `next`, refusing any backwards step
    pub fn transition(&mut self, next: TrackState) -> Result<(), TrackerError> {
        if !self.state.can_transition_to(next) {
            return Err(TrackerError::IllegalTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        if self.state != next {
            debug!(track_id = self.id, from = ?self.state, to = ?next, "Track state change");
            self.state = next;
        }
        Ok(())
    }

    pub fn motion(&self) -> MotionVector {
        MotionVector::new(self.velocity.x, self.velocity.y)
    }

    pub fn snapshot(&self, frame_index: u64, timestamp: f64) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            class_label: self.class_label.clone(),
            state: self.state,
            bbox: self.bbox,
            confidence: self.confidence,
            motion: self.motion(),
            age: self.age,
            misses: self.misses,
            hit_streak: self.hit_streak,
            matched: self.matched,
            frame_index,
            timestamp,
            history: self.history.iter().cloned().collect(),
        }
    }

    fn record(&mut self, det: &Detection) {
        let (cx, cy) = det.bbox.center();
        self.history.push_overwrite(Observation {
            frame_index: det.frame_index,
            timestamp: det.timestamp,
            position: (cx, cy),
            class_label: det.class_label.clone(),
            confidence: det.confidence,
        });
    }

    /// Most frequent label in the ring; ties go to the most recently seen label
    fn vote_class(&self) -> String {
        let mut tally: HashMap<&str, (usize, usize)> = HashMap::new();
        for (i, obs) in self.history.iter().enumerate() {
            let entry = tally.entry(obs.class_label.as_str()).or_insert((0, i));
            entry.0 += 1;
            entry.1 = i;
        }
        tally
            .into_iter()
            .max_by_key(|(_, (count, last))| (*count, *last))
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| self.class_label.clone())
    }
}

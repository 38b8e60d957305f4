//! TrackSnapshot - Tracker output
//!
//! Read-only copies of track state handed to the rule evaluators each frame.

use serde::{Deserialize, Serialize};

use crate::BBox;

/// Track identifier (monotonic, never reused within a process)
pub type TrackId = u64;

/// Track lifecycle state
///
/// Transitions only move forward: Tentative → Confirmed → Lost → deleted.
/// A Tentative track that goes stale is deleted without ever being Confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Tentative,
    Confirmed,
    Lost,
}

impl TrackState {
    /// Ordering rank used to enforce forward-only transitions
    pub fn rank(&self) -> u8 {
        match self {
            Self::Tentative => 0,
            Self::Confirmed => 1,
            Self::Lost => 2,
        }
    }

    /// Whether `next` is a legal successor of `self` (staying put is legal)
    pub fn can_transition_to(&self, next: TrackState) -> bool {
        match (self, next) {
            (a, b) if *a == b => true,
            (Self::Tentative, Self::Confirmed) => true,
            (Self::Tentative, Self::Lost) => true,
            (Self::Confirmed, Self::Lost) => true,
            _ => false,
        }
    }
}

/// Smoothed per-frame displacement, in frame-normalized units per frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionVector {
    pub dx: f64,
    pub dy: f64,
}

impl MotionVector {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Magnitude (frame-normalized units per frame)
    pub fn speed(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }

    /// Heading in degrees, normalized to `[0, 360)`
    pub fn heading_deg(&self) -> f64 {
        normalize_deg(self.dy.atan2(self.dx).to_degrees())
    }
}

/// Normalize an angle to `[0, 360)`
pub fn normalize_deg(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Smallest absolute difference between two headings, in `[0, 180]`
pub fn angular_deviation_deg(a: f64, b: f64) -> f64 {
    let d = (normalize_deg(a) - normalize_deg(b)).abs();
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// One matched detection in a track's history ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub frame_index: u64,
    pub timestamp: f64,
    /// Box center
    pub position: (f64, f64),
    pub class_label: String,
    pub confidence: f64,
}

/// Immutable copy of a track at the end of a tracker update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,

    /// Majority vote over the history ring
    pub class_label: String,

    pub state: TrackState,

    /// Latest matched box
    pub bbox: BBox,

    /// Confidence of the latest matched detection
    pub confidence: f64,

    /// Exponentially smoothed displacement
    pub motion: MotionVector,

    /// Frames since creation
    pub age: u32,

    /// Consecutive frames with no matched detection
    pub misses: u32,

    /// Consecutive frames with a matched detection
    pub hit_streak: u32,

    /// Whether the track was matched in the frame this snapshot describes
    pub matched: bool,

    /// Frame the snapshot was taken on
    pub frame_index: u64,

    /// Capture timestamp of the frame the snapshot was taken on
    pub timestamp: f64,

    /// Last K observations, oldest first
    pub history: Vec<Observation>,
}

impl TrackSnapshot {
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }

    /// Most recent observation, if any
    pub fn latest(&self) -> Option<&Observation> {
        self.history.last()
    }
}

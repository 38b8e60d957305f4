//! SafetyEvent - Rule evaluator output
//!
//! Immutable, published once, consumed by any number of subscribers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BBox, TrackId};

/// Event type (closed set of rule outcomes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    LaneViolation,
    EmergencyVehicle,
    Hazard,
}

impl EventType {
    pub const ALL: [EventType; 3] = [
        EventType::LaneViolation,
        EventType::EmergencyVehicle,
        EventType::Hazard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LaneViolation => "LANE_VIOLATION",
            Self::EmergencyVehicle => "EMERGENCY_VEHICLE",
            Self::Hazard => "HAZARD",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// What an event is about, for de-duplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// A tracked object
    Track(TrackId),
    /// A spatial cluster of frame-level hazard sightings
    HazardCluster(u64),
}

/// De-duplication key: (subject, event type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub subject: Subject,
    pub event_type: EventType,
}

impl DedupKey {
    pub fn track(track_id: TrackId, event_type: EventType) -> Self {
        Self {
            subject: Subject::Track(track_id),
            event_type,
        }
    }

    pub fn hazard_cluster(cluster_id: u64) -> Self {
        Self {
            subject: Subject::HazardCluster(cluster_id),
            event_type: EventType::Hazard,
        }
    }

    /// Track id, if the subject is a track
    pub fn track_id(&self) -> Option<TrackId> {
        match self.subject {
            Subject::Track(id) => Some(id),
            Subject::HazardCluster(_) => None,
        }
    }
}

/// Free-form event details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Class label of the object that triggered the event
    pub class_label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Observed heading (degrees)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,

    /// Expected heading of the lane the object is in (degrees)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_heading_deg: Option<f64>,

    /// Angular deviation from the expected heading (degrees)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_deg: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane_index: Option<usize>,

    /// Relative bounding-box area (hazards)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_fraction: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<u64>,

    /// Number of consecutive qualifying frames that justified the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<u32>,
}

/// Immutable safety event record
///
/// Serializes to one self-describing line of the persisted event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEvent {
    /// Unique event identifier
    #[serde(rename = "id")]
    pub event_id: Uuid,

    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Source track (none for frame-level hazards)
    pub track_id: Option<TrackId>,

    /// Camera the detections came from
    pub camera_id: String,

    /// Frame on which the event was raised
    pub frame_index: u64,

    /// Capture timestamp of that frame (seconds)
    pub timestamp: f64,

    /// Wall-clock emission time, `%Y-%m-%d %H:%M:%S` UTC
    pub time_fmt: String,

    pub severity: Severity,

    pub dedup_key: DedupKey,

    pub payload: EventPayload,
}

impl SafetyEvent {
    /// Create a new event stamped with a fresh id and the current wall clock
    pub fn new(
        dedup_key: DedupKey,
        camera_id: impl Into<String>,
        frame_index: u64,
        timestamp: f64,
        severity: Severity,
        payload: EventPayload,
    ) -> Self {
        Self::with_emitted_at(
            dedup_key,
            camera_id,
            frame_index,
            timestamp,
            severity,
            payload,
            Utc::now(),
        )
    }

    /// Create a new event with an explicit emission time
    pub fn with_emitted_at(
        dedup_key: DedupKey,
        camera_id: impl Into<String>,
        frame_index: u64,
        timestamp: f64,
        severity: Severity,
        payload: EventPayload,
        emitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: dedup_key.event_type,
            track_id: dedup_key.track_id(),
            camera_id: camera_id.into(),
            frame_index,
            timestamp,
            time_fmt: emitted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            severity,
            dedup_key,
            payload,
        }
    }
}

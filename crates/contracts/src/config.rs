//! SafetyConfig - Config Loader output
//!
//! Every rule threshold lives here; nothing downstream hard-codes a policy
//! constant. All sections default, so an empty document is a valid config.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{SinkConfig, SinkType};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SafetyConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    #[validate(nested)]
    pub source: SourceConfig,

    #[serde(default)]
    #[validate(nested)]
    pub classes: ClassConfig,

    #[serde(default)]
    #[validate(nested)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub lane: LaneConfig,

    #[serde(default)]
    #[validate(nested)]
    pub emergency: EmergencyConfig,

    #[serde(default)]
    #[validate(nested)]
    pub hazard: HazardConfig,

    #[serde(default)]
    #[validate(nested)]
    pub bus: BusConfig,

    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,

    /// Output routing
    #[serde(default = "default_sinks")]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            source: SourceConfig::default(),
            classes: ClassConfig::default(),
            tracker: TrackerConfig::default(),
            lane: LaneConfig::default(),
            emergency: EmergencyConfig::default(),
            hazard: HazardConfig::default(),
            bus: BusConfig::default(),
            queue: QueueConfig::default(),
            sinks: default_sinks(),
        }
    }
}

impl SafetyConfig {
    /// Look up a sink by name
    pub fn sink(&self, name: &str) -> Option<&SinkConfig> {
        self.sinks.iter().find(|s| s.name == name)
    }
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![
        SinkConfig::new("console", SinkType::Log),
        SinkConfig::new("event_log", SinkType::File)
            .with_param("path", crate::DEFAULT_EVENT_LOG_PATH),
    ]
}

/// Detection source labelling
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Camera label stamped onto every event
    #[serde(default = "default_camera_id")]
    #[validate(length(min = 1))]
    pub camera_id: String,
}

fn default_camera_id() -> String {
    "CAM_01".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            camera_id: default_camera_id(),
        }
    }
}

/// Class-label sets the rules key on
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClassConfig {
    /// Classes tracked and checked for lane direction
    #[serde(default = "default_vehicle_classes")]
    #[validate(length(min = 1))]
    pub vehicle: Vec<String>,

    /// Privileged classes for the emergency rule
    #[serde(default = "default_emergency_classes")]
    #[validate(length(min = 1))]
    pub emergency: Vec<String>,

    /// Stationary classes handled per frame, never tracked
    #[serde(default = "default_hazard_classes")]
    #[validate(length(min = 1))]
    pub hazard: Vec<String>,
}

fn default_vehicle_classes() -> Vec<String> {
    ["car", "truck", "bus", "motorcycle", "ambulance", "fire_truck", "police"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_emergency_classes() -> Vec<String> {
    ["ambulance", "fire_truck", "police"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_hazard_classes() -> Vec<String> {
    vec!["pothole".to_string()]
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            vehicle: default_vehicle_classes(),
            emergency: default_emergency_classes(),
            hazard: default_hazard_classes(),
        }
    }
}

impl ClassConfig {
    pub fn is_vehicle(&self, label: &str) -> bool {
        self.vehicle.iter().any(|c| c == label)
    }

    pub fn is_emergency(&self, label: &str) -> bool {
        self.emergency.iter().any(|c| c == label)
    }

    pub fn is_hazard(&self, label: &str) -> bool {
        self.hazard.iter().any(|c| c == label)
    }
}

/// Tracker matching and lifecycle thresholds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections below this confidence are ignored
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,

    /// Weight of IoU in the match score
    #[validate(range(min = 0.0, max = 1.0))]
    pub iou_weight: f64,

    /// Weight of normalized centroid proximity in the match score
    #[validate(range(min = 0.0, max = 1.0))]
    pub distance_weight: f64,

    /// Pairs whose centers are further apart than this never match
    #[validate(range(exclusive_min = 0.0, max = 1.5))]
    pub max_centroid_distance: f64,

    /// Pairs scoring below this never match
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_match_score: f64,

    /// EMA smoothing factor for the motion vector
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub alpha: f64,

    /// History ring length (K)
    #[validate(range(min = 2, max = 1024))]
    pub history_len: usize,

    /// Consecutive matched frames needed to confirm
    #[validate(range(min = 1))]
    pub confirm_hits: u32,

    /// Consecutive misses tolerated before Lost
    #[validate(range(min = 1))]
    pub max_misses: u32,

    /// Frames a Lost track is retained before deletion
    pub lost_grace_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            iou_weight: 0.7,
            distance_weight: 0.3,
            max_centroid_distance: 0.2,
            min_match_score: 0.3,
            alpha: 0.3,
            history_len: 30,
            confirm_hits: 5,
            max_misses: 10,
            lost_grace_frames: 30,
        }
    }
}

/// Lane-direction rule
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LaneConfig {
    /// Normalized x positions separating lanes; empty splits the frame in two
    pub boundaries: Vec<f64>,

    /// Expected heading per lane, degrees (0 = +x, 90 = +y)
    #[validate(length(min = 1))]
    pub headings_deg: Vec<f64>,

    /// Deviation above which a reading counts as wrong-way
    #[validate(range(exclusive_min = 0.0, max = 180.0))]
    pub deviation_threshold_deg: f64,

    /// Below this speed the heading is unreliable and the rule abstains
    #[validate(range(min = 0.0))]
    pub min_speed: f64,

    /// Tracks whose latest detection is less confident than this are not judged
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,

    /// Consecutive deviating evaluations needed to raise an event (M)
    #[validate(range(min = 1))]
    pub violation_frames: u32,

    /// Consecutive non-deviating evaluations that clear a track's cooldown
    #[validate(range(min = 1))]
    pub recovery_frames: u32,

    /// Minimum frames between two events for the same track
    pub cooldown_frames: u64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            boundaries: Vec::new(),
            headings_deg: vec![270.0, 90.0],
            deviation_threshold_deg: 25.0,
            min_speed: 0.002,
            min_confidence: 0.65,
            violation_frames: 5,
            recovery_frames: 10,
            cooldown_frames: 150,
        }
    }
}

impl LaneConfig {
    /// Effective lane boundaries (empty means a single split at the middle)
    pub fn effective_boundaries(&self) -> Vec<f64> {
        if self.boundaries.is_empty() {
            vec![0.5]
        } else {
            self.boundaries.clone()
        }
    }

    /// Number of lanes the boundaries describe
    pub fn lane_count(&self) -> usize {
        self.effective_boundaries().len() + 1
    }
}

/// Emergency-priority rule
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Gating confidence for a privileged-class reading
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,

    /// Consecutive qualifying frames required
    #[validate(range(min = 1))]
    pub streak_frames: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            streak_frames: 3,
        }
    }
}

/// Hazard-severity rule
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HazardConfig {
    /// Area fraction below which severity is Low
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub t1: f64,

    /// Area fraction above which severity is High
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub t2: f64,

    /// Hazard boxes smaller than this are ignored
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_area_fraction: f64,

    /// Sightings within this distance of a known cluster belong to it
    #[validate(range(exclusive_min = 0.0, max = 1.5))]
    pub cluster_radius: f64,

    /// Frames a cluster stays suppressed after being reported
    pub cooldown_frames: u64,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            t1: 0.03,
            t2: 0.1,
            min_area_fraction: 0.0005,
            cluster_radius: 0.05,
            cooldown_frames: 300,
        }
    }
}

/// Event bus behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BusConfig {
    /// Handler calls slower than this log a slow-subscriber warning
    #[validate(range(min = 1))]
    pub slow_subscriber_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            slow_subscriber_ms: 50,
        }
    }
}

/// Detection queue between the source and the frame loop
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueueConfig {
    #[validate(range(min = 1))]
    pub capacity: usize,

    /// A producer blocked longer than this surfaces a queue overflow
    #[validate(range(min = 1))]
    pub send_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            send_timeout_ms: 5000,
        }
    }
}

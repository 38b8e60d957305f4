//! Detection - Detection Source output
//!
//! One class-labeled bounding box per object per frame.

use serde::{Deserialize, Serialize};

/// Frame-normalized bounding box (top-left corner + size)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Build a box of the given size centered on `(cx, cy)`
    pub fn centered(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            w,
            h,
        }
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    /// Area relative to the frame (frame area is 1.0)
    #[inline]
    pub fn area(&self) -> f64 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }

    /// Intersection over union
    pub fn iou(&self, other: &BBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Euclidean distance between centers
    pub fn center_distance(&self, other: &BBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// Reason a detection was rejected before tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// NaN or infinite coordinate
    NonFiniteBox,
    /// Zero or negative width/height
    DegenerateBox,
    /// Confidence outside `[0, 1]` or not finite
    ConfidenceOutOfRange,
    /// Empty class label
    MissingClass,
}

impl MalformedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonFiniteBox => "non_finite_box",
            Self::DegenerateBox => "degenerate_box",
            Self::ConfidenceOutOfRange => "confidence_out_of_range",
            Self::MissingClass => "missing_class",
        }
    }
}

/// Single object detection (ephemeral, owned by its frame)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector class label (e.g. "car", "ambulance", "pothole")
    #[serde(rename = "class")]
    pub class_label: String,

    /// Detector confidence in `[0, 1]`
    pub confidence: f64,

    /// Frame-normalized bounding box
    pub bbox: BBox,

    /// Frame the detection belongs to (stamped from the batch if absent)
    #[serde(default)]
    pub frame_index: u64,

    /// Capture timestamp in seconds (stamped from the batch if absent)
    #[serde(default)]
    pub timestamp: f64,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, confidence: f64, bbox: BBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bbox,
            frame_index: 0,
            timestamp: 0.0,
        }
    }

    /// Check the detection is usable; returns the first problem found
    pub fn check(&self) -> Result<(), MalformedReason> {
        if self.class_label.trim().is_empty() {
            return Err(MalformedReason::MissingClass);
        }
        if !self.bbox.is_finite() {
            return Err(MalformedReason::NonFiniteBox);
        }
        if self.bbox.w <= 0.0 || self.bbox.h <= 0.0 {
            return Err(MalformedReason::DegenerateBox);
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(MalformedReason::ConfidenceOutOfRange);
        }
        Ok(())
    }
}

/// All detections of one frame, as handed to the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    /// Frame sequence number (monotonically increasing)
    pub frame_index: u64,

    /// Capture timestamp in seconds
    pub timestamp: f64,

    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl FrameDetections {
    /// Create a batch, stamping every detection with the frame's index and time
    pub fn new(frame_index: u64, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            frame_index,
            timestamp,
            detections,
        }
        .stamped()
    }

    /// Overwrite per-detection frame index and timestamp with the batch values
    pub fn stamped(mut self) -> Self {
        for det in &mut self.detections {
            det.frame_index = self.frame_index;
            det.timestamp = self.timestamp;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical() {
        let a = BBox::new(0.1, 0.1, 0.2, 0.2);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BBox::new(0.0, 0.0, 0.1, 0.1);
        let b = BBox::new(0.5, 0.5, 0.1, 0.1);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BBox::new(0.0, 0.0, 0.2, 0.2);
        let b = BBox::new(0.1, 0.0, 0.2, 0.2);
        // inter = 0.1*0.2 = 0.02, union = 0.04+0.04-0.02 = 0.06
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_check_rejects_malformed() {
        let good = Detection::new("car", 0.9, BBox::new(0.1, 0.1, 0.1, 0.1));
        assert!(good.check().is_ok());

        let mut nan = good.clone();
        nan.bbox.x = f64::NAN;
        assert_eq!(nan.check(), Err(MalformedReason::NonFiniteBox));

        let mut conf = good.clone();
        conf.confidence = 1.5;
        assert_eq!(conf.check(), Err(MalformedReason::ConfidenceOutOfRange));

        let mut flat = good.clone();
        flat.bbox.h = 0.0;
        assert_eq!(flat.check(), Err(MalformedReason::DegenerateBox));

        let mut unnamed = good;
        unnamed.class_label = " ".into();
        assert_eq!(unnamed.check(), Err(MalformedReason::MissingClass));
    }

    #[test]
    fn test_batch_stamps_detections() {
        let batch = FrameDetections::new(
            7,
            0.25,
            vec![Detection::new("car", 0.8, BBox::new(0.0, 0.0, 0.1, 0.1))],
        );
        assert_eq!(batch.detections[0].frame_index, 7);
        assert_eq!(batch.detections[0].timestamp, 0.25);
    }

    #[test]
    fn test_parse_jsonl_frame() {
        let line = r#"{"frame_index": 3, "timestamp": 0.1, "detections": [{"class": "car", "confidence": 0.9, "bbox": {"x": 0.1, "y": 0.2, "w": 0.05, "h": 0.04}}]}"#;
        let frame: FrameDetections = serde_json::from_str(line).unwrap();
        let frame = frame.stamped();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.detections[0].class_label, "car");
        assert_eq!(frame.detections[0].frame_index, 3);
    }
}

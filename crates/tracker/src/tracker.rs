//! Frame-by-frame multi-object tracker.

use contracts::{ClassConfig, Detection, FrameDetections, TrackId, TrackSnapshot, TrackState, TrackerConfig};
use metrics::counter;
use tracing::{debug, instrument, trace};

use crate::track::Track;
use crate::TrackerError;

/// Result of one tracker update
#[derive(Debug, Clone, Default)]
pub struct TrackerUpdate {
    pub frame_index: u64,
    pub timestamp: f64,
    /// Snapshots of every live track after the update, ordered by id
    pub tracks: Vec<TrackSnapshot>,
    /// Ids deleted during this update (rule state for them must be evicted)
    pub deleted: Vec<TrackId>,
    /// Hazard-class detections, routed around the tracker
    pub hazards: Vec<Detection>,
    /// Detections that entered matching
    pub accepted: usize,
    /// Malformed detections dropped
    pub malformed: usize,
    /// Detections under the confidence floor
    pub below_floor: usize,
}

impl TrackerUpdate {
    /// Snapshots matched on this frame
    pub fn matched(&self) -> impl Iterator<Item = &TrackSnapshot> {
        self.tracks.iter().filter(|t| t.matched)
    }
}

/// Cumulative tracker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub frames: u64,
    pub detections_accepted: u64,
    pub detections_malformed: u64,
    pub detections_below_floor: u64,
    pub hazard_detections: u64,
    pub tracks_created: u64,
    pub tracks_confirmed: u64,
    pub tracks_lost: u64,
    pub tracks_deleted: u64,
}

/// Multi-object tracker
///
/// Greedy matching on a weighted IoU + centroid-proximity score. The track
/// table is never shared; callers only ever see snapshots.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    classes: ClassConfig,
    tracks: Vec<Track>,
    next_id: TrackId,
    stats: TrackerStats,
}

impl Tracker {
    pub fn new(config: TrackerConfig, classes: ClassConfig) -> Self {
        Self {
            config,
            classes,
            tracks: Vec::new(),
            next_id: 1,
            stats: TrackerStats::default(),
        }
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Number of live tracks (any state)
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Snapshot of one live track
    pub fn get(&self, id: TrackId, frame_index: u64, timestamp: f64) -> Option<TrackSnapshot> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.snapshot(frame_index, timestamp))
    }

    /// Match score of a track/detection pair, or `None` when the pair is rejected
    fn match_score(&self, track: &Track, det: &Detection) -> Option<f64> {
        let distance = track.bbox.center_distance(&det.bbox);
        if distance > self.config.max_centroid_distance {
            return None;
        }
        let proximity = 1.0 - distance / self.config.max_centroid_distance;
        let score = self.config.iou_weight * track.bbox.iou(&det.bbox)
            + self.config.distance_weight * proximity;
        (score >= self.config.min_match_score).then_some(score)
    }

    /// Process one frame of detections
    ///
    /// # Errors
    /// Only on internal invariant violations (duplicate id, backwards
    /// transition). Malformed input is counted and dropped.
    #[instrument(name = "tracker_update", skip(self, frame), fields(frame_index = frame.frame_index, detections = frame.len()))]
    pub fn update(&mut self, frame: &FrameDetections) -> Result<TrackerUpdate, TrackerError> {
        let mut out = TrackerUpdate {
            frame_index: frame.frame_index,
            timestamp: frame.timestamp,
            ..Default::default()
        };

        // Triage: malformed -> dropped, hazards -> bypass, low confidence -> ignored
        let mut valid: Vec<&Detection> = Vec::with_capacity(frame.len());
        for det in &frame.detections {
            if let Err(reason) = det.check() {
                out.malformed += 1;
                counter!("traffic_guard_detections_dropped_total", "reason" => reason.as_str())
                    .increment(1);
                debug!(frame_index = frame.frame_index, reason = reason.as_str(), "Dropped malformed detection");
                continue;
            }
            if self.classes.is_hazard(&det.class_label) {
                out.hazards.push(det.clone());
                continue;
            }
            if det.confidence < self.config.min_confidence {
                out.below_floor += 1;
                continue;
            }
            valid.push(det);
        }
        out.accepted = valid.len();

        for track in &mut self.tracks {
            track.age += 1;
            track.matched = false;
        }

        // Candidate pairs; Lost tracks are never matched (no resurrection)
        let mut matched_track_indices: Vec<bool> = vec![false; self.tracks.len()];
        let mut matched_det_indices: Vec<bool> = vec![false; valid.len()];

        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            if track.state == TrackState::Lost {
                continue;
            }
            for (di, det) in valid.iter().enumerate() {
                if let Some(score) = self.match_score(track, det) {
                    pairs.push((ti, di, score));
                }
            }
        }
        // Highest score first; ties broken by older track, then earlier detection
        pairs.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });

        for (ti, di, score) in &pairs {
            if matched_track_indices[*ti] || matched_det_indices[*di] {
                continue;
            }
            matched_track_indices[*ti] = true;
            matched_det_indices[*di] = true;
            trace!(track_id = self.tracks[*ti].id, score, "Matched");
            self.tracks[*ti].update_with_detection(valid[*di], self.config.alpha);
        }

        // Unmatched tracks
        for (ti, matched) in matched_track_indices.iter().enumerate() {
            if !matched {
                let track = &mut self.tracks[ti];
                if track.state == TrackState::Lost {
                    track.lost_frames += 1;
                } else {
                    track.mark_missed();
                }
            }
        }

        // Unmatched detections -> new tentative tracks
        for (di, matched) in matched_det_indices.iter().enumerate() {
            if !matched {
                self.spawn(valid[di])?;
            }
        }

        self.advance_lifecycle()?;
        out.deleted = self.prune();

        out.tracks = self
            .tracks
            .iter()
            .map(|t| t.snapshot(frame.frame_index, frame.timestamp))
            .collect();

        self.stats.frames += 1;
        self.stats.detections_accepted += out.accepted as u64;
        self.stats.detections_malformed += out.malformed as u64;
        self.stats.detections_below_floor += out.below_floor as u64;
        self.stats.hazard_detections += out.hazards.len() as u64;

        Ok(out)
    }

    fn spawn(&mut self, det: &Detection) -> Result<(), TrackerError> {
        let id = self.next_id;
        if self.tracks.iter().any(|t| t.id == id) {
            return Err(TrackerError::DuplicateTrackId(id));
        }
        self.next_id += 1;

        let mut track = Track::new(id, det, self.config.history_len);
        if track.hit_streak >= self.config.confirm_hits {
            track.transition(TrackState::Confirmed)?;
            self.stats.tracks_confirmed += 1;
        }
        debug!(track_id = id, class = %det.class_label, "New track");
        self.tracks.push(track);
        self.stats.tracks_created += 1;
        Ok(())
    }

    /// Tentative -> Confirmed on streak, Tentative/Confirmed -> Lost on misses
    fn advance_lifecycle(&mut self) -> Result<(), TrackerError> {
        let confirm_hits = self.config.confirm_hits;
        let max_misses = self.config.max_misses;

        for track in &mut self.tracks {
            match track.state {
                TrackState::Tentative if track.matched && track.hit_streak >= confirm_hits => {
                    track.transition(TrackState::Confirmed)?;
                    self.stats.tracks_confirmed += 1;
                }
                TrackState::Confirmed if track.misses > max_misses => {
                    track.transition(TrackState::Lost)?;
                    self.stats.tracks_lost += 1;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Delete expired Lost tracks and stale Tentative ones
    fn prune(&mut self) -> Vec<TrackId> {
        let max_misses = self.config.max_misses;
        let grace = self.config.lost_grace_frames;
        let mut deleted = Vec::new();

        self.tracks.retain(|t| {
            let expired = match t.state {
                TrackState::Lost => t.lost_frames >= grace,
                TrackState::Tentative => t.misses > max_misses,
                TrackState::Confirmed => false,
            };
            if expired {
                debug!(track_id = t.id, state = ?t.state, age = t.age, "Track deleted");
                deleted.push(t.id);
            }
            !expired
        });

        self.stats.tracks_deleted += deleted.len() as u64;
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BBox;

    fn car(cx: f64, cy: f64) -> Detection {
        Detection::new("car", 0.9, BBox::centered(cx, cy, 0.1, 0.1))
    }

    fn frame(i: u64, dets: Vec<Detection>) -> FrameDetections {
        FrameDetections::new(i, i as f64 / 30.0, dets)
    }

    fn tracker() -> Tracker {
        Tracker::new(TrackerConfig::default(), ClassConfig::default())
    }

    #[test]
    fn test_confirmation_after_streak() {
        let mut t = tracker();
        for i in 0..4 {
            let up = t.update(&frame(i, vec![car(0.5 + i as f64 * 0.01, 0.5)])).unwrap();
            assert_eq!(up.tracks[0].state, TrackState::Tentative);
        }
        let up = t.update(&frame(4, vec![car(0.54, 0.5)])).unwrap();
        assert_eq!(up.tracks.len(), 1);
        assert_eq!(up.tracks[0].state, TrackState::Confirmed);
        assert_eq!(up.tracks[0].id, 1);
    }

    #[test]
    fn test_malformed_dropped_and_counted() {
        let mut t = tracker();
        let mut bad = car(0.5, 0.5);
        bad.bbox.w = f64::NAN;
        let mut conf = car(0.2, 0.2);
        conf.confidence = -0.1;
        let up = t.update(&frame(0, vec![bad, conf, car(0.8, 0.8)])).unwrap();
        assert_eq!(up.malformed, 2);
        assert_eq!(up.accepted, 1);
        assert_eq!(up.tracks.len(), 1);
        assert_eq!(t.stats().detections_malformed, 2);
    }

    #[test]
    fn test_hazards_and_low_confidence_bypass_tracking() {
        let mut t = tracker();
        let pothole = Detection::new("pothole", 0.8, BBox::new(0.4, 0.8, 0.1, 0.05));
        let faint = Detection::new("car", 0.2, BBox::new(0.1, 0.1, 0.1, 0.1));
        let up = t.update(&frame(0, vec![pothole, faint])).unwrap();
        assert!(up.tracks.is_empty());
        assert_eq!(up.hazards.len(), 1);
        assert_eq!(up.below_floor, 1);
    }

    #[test]
    fn test_greedy_prefers_best_pair() {
        let mut t = tracker();
        t.update(&frame(0, vec![car(0.3, 0.5), car(0.6, 0.5)])).unwrap();
        // both detections moved slightly; each must keep its own id
        let up = t.update(&frame(1, vec![car(0.61, 0.5), car(0.31, 0.5)])).unwrap();
        let left = up.tracks.iter().find(|s| s.id == 1).unwrap();
        let right = up.tracks.iter().find(|s| s.id == 2).unwrap();
        assert!((left.center().0 - 0.31).abs() < 1e-9);
        assert!((right.center().0 - 0.61).abs() < 1e-9);
    }

    #[test]
    fn test_far_detection_spawns_new_track() {
        let mut t = tracker();
        t.update(&frame(0, vec![car(0.1, 0.1)])).unwrap();
        let up = t.update(&frame(1, vec![car(0.9, 0.9)])).unwrap();
        assert_eq!(up.tracks.len(), 2);
        assert_eq!(up.tracks[1].id, 2);
    }

    #[test]
    fn test_lost_then_deleted_without_revival() {
        let config = TrackerConfig {
            confirm_hits: 2,
            max_misses: 2,
            lost_grace_frames: 3,
            ..Default::default()
        };
        let mut t = Tracker::new(config, ClassConfig::default());
        t.update(&frame(0, vec![car(0.5, 0.5)])).unwrap();
        t.update(&frame(1, vec![car(0.5, 0.5)])).unwrap();

        let mut states = Vec::new();
        let mut deleted_at = None;
        for i in 2..12 {
            let up = t.update(&frame(i, vec![])).unwrap();
            if let Some(s) = up.tracks.first() {
                states.push(s.state);
            }
            if up.deleted.contains(&1) {
                deleted_at = Some(i);
                break;
            }
        }
        // misses 1,2 confirmed; miss 3 -> Lost; 3 grace frames -> deleted
        use TrackState::*;
        assert_eq!(states, vec![Confirmed, Confirmed, Lost, Lost, Lost]);
        assert_eq!(deleted_at, Some(7));

        // same place again: a fresh id
        let up = t.update(&frame(12, vec![car(0.5, 0.5)])).unwrap();
        assert_eq!(up.tracks[0].id, 2);
        assert_eq!(up.tracks[0].state, TrackState::Tentative);
    }

    #[test]
    fn test_lost_track_is_not_matched() {
        let config = TrackerConfig {
            confirm_hits: 1,
            max_misses: 1,
            lost_grace_frames: 10,
            ..Default::default()
        };
        let mut t = Tracker::new(config, ClassConfig::default());
        t.update(&frame(0, vec![car(0.5, 0.5)])).unwrap();
        t.update(&frame(1, vec![])).unwrap();
        let up = t.update(&frame(2, vec![])).unwrap();
        assert_eq!(up.tracks[0].state, TrackState::Lost);

        let up = t.update(&frame(3, vec![car(0.5, 0.5)])).unwrap();
        let old = up.tracks.iter().find(|s| s.id == 1).unwrap();
        assert_eq!(old.state, TrackState::Lost);
        assert!(up.tracks.iter().any(|s| s.id == 2 && s.matched));
    }

    #[test]
    fn test_stale_tentative_deleted() {
        let mut t = tracker();
        t.update(&frame(0, vec![car(0.5, 0.5)])).unwrap();
        let mut deleted = Vec::new();
        for i in 1..=11 {
            deleted.extend(t.update(&frame(i, vec![])).unwrap().deleted);
        }
        assert_eq!(deleted, vec![1]);
        assert!(t.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_fatal() {
        let mut t = tracker();
        t.update(&frame(0, vec![car(0.2, 0.2)])).unwrap();
        t.next_id = 1;
        let err = t.update(&frame(1, vec![car(0.2, 0.2), car(0.8, 0.8)])).unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateTrackId(1)));
    }

    #[test]
    fn test_states_only_move_forward() {
        let config = TrackerConfig {
            confirm_hits: 3,
            max_misses: 2,
            lost_grace_frames: 2,
            ..Default::default()
        };
        let mut t = Tracker::new(config, ClassConfig::default());
        let pattern = [true, true, false, true, true, true, false, false, false, true, false, false, false];
        let mut last: Option<TrackState> = None;
        for (i, present) in pattern.iter().enumerate() {
            let dets = if *present { vec![car(0.5, 0.5)] } else { vec![] };
            let up = t.update(&frame(i as u64, dets)).unwrap();
            if let Some(s) = up.tracks.iter().find(|s| s.id == 1) {
                if let Some(prev) = last {
                    assert!(prev.can_transition_to(s.state), "{prev:?} -> {:?}", s.state);
                }
                last = Some(s.state);
            }
        }
        assert_eq!(last, Some(TrackState::Lost));
    }
}

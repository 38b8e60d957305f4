//! Lane-violation rule
//!
//! A confirmed, moving vehicle detected with at least `min_confidence` whose
//! heading disagrees with its lane's expected heading for `violation_frames`
//! consecutive evaluations raises one event. The track then stays latched until it drives correctly for
//! `recovery_frames` frames (or is deleted), and the ledger cooldown applies
//! on top of that.

use std::collections::HashMap;

use contracts::{
    angular_deviation_deg, ClassConfig, DedupKey, EventPayload, EventType, LaneConfig, Severity,
    TrackId, TrackSnapshot,
};
use tracing::{debug, info};

use crate::cooldown::CooldownLedger;
use crate::rule::Candidate;

#[derive(Debug, Default, Clone, Copy)]
struct LaneTrackState {
    /// Consecutive deviating evaluations
    run: u32,
    /// Consecutive conforming evaluations while latched
    recovery: u32,
    latched: bool,
    last_frame: Option<u64>,
}

/// One heading reading against the lane layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneReading {
    pub lane_index: usize,
    pub heading_deg: f64,
    pub expected_heading_deg: f64,
    pub deviation_deg: f64,
}

#[derive(Debug)]
pub struct LaneRule {
    config: LaneConfig,
    boundaries: Vec<f64>,
    state: HashMap<TrackId, LaneTrackState>,
}

impl LaneRule {
    pub fn new(config: LaneConfig) -> Self {
        let boundaries = config.effective_boundaries();
        Self {
            config,
            boundaries,
            state: HashMap::new(),
        }
    }

    /// Lane region containing normalized x coordinate `cx`
    pub fn lane_index(&self, cx: f64) -> usize {
        self.boundaries.iter().filter(|b| **b <= cx).count()
    }

    /// Heading reading for a track, or None when the rule abstains
    pub fn reading(&self, track: &TrackSnapshot) -> Option<LaneReading> {
        if track.confidence < self.config.min_confidence
            || track.motion.speed() < self.config.min_speed
        {
            return None;
        }
        let (cx, _) = track.center();
        let lane_index = self.lane_index(cx);
        let expected_heading_deg = *self.config.headings_deg.get(lane_index)?;
        let heading_deg = track.motion.heading_deg();
        Some(LaneReading {
            lane_index,
            heading_deg,
            expected_heading_deg,
            deviation_deg: angular_deviation_deg(heading_deg, expected_heading_deg),
        })
    }

    /// Evaluate one matched track snapshot
    pub fn evaluate(
        &mut self,
        track: &TrackSnapshot,
        classes: &ClassConfig,
        ledger: &mut CooldownLedger,
    ) -> Option<Candidate> {
        if !track.is_confirmed() || !track.matched || !classes.is_vehicle(&track.class_label) {
            return None;
        }

        let reading = self.reading(track);
        let state = self.state.entry(track.id).or_default();

        // A skipped frame breaks the run
        if state.last_frame.map_or(true, |f| f + 1 != track.frame_index) {
            state.run = 0;
        }
        state.last_frame = Some(track.frame_index);

        let Some(reading) = reading else {
            state.run = 0;
            return None;
        };

        if reading.deviation_deg <= self.config.deviation_threshold_deg {
            state.run = 0;
            if state.latched {
                state.recovery += 1;
                if state.recovery >= self.config.recovery_frames {
                    state.latched = false;
                    state.recovery = 0;
                    debug!(track_id = track.id, "Lane violation latch cleared");
                }
            }
            return None;
        }

        state.run += 1;
        state.recovery = 0;
        if state.latched || state.run < self.config.violation_frames {
            return None;
        }

        let key = DedupKey::track(track.id, EventType::LaneViolation);
        if !ledger.try_acquire(key, track.frame_index, self.config.cooldown_frames) {
            debug!(track_id = track.id, frame_index = track.frame_index, "Lane violation suppressed by cooldown");
            return None;
        }
        state.latched = true;

        info!(
            track_id = track.id,
            lane_index = reading.lane_index,
            deviation_deg = reading.deviation_deg,
            streak = state.run,
            "Lane violation"
        );

        Some(Candidate {
            dedup_key: key,
            severity: Severity::High,
            payload: EventPayload {
                class_label: track.class_label.clone(),
                bbox: Some(track.bbox),
                confidence: Some(track.confidence),
                heading_deg: Some(reading.heading_deg),
                expected_heading_deg: Some(reading.expected_heading_deg),
                deviation_deg: Some(reading.deviation_deg),
                lane_index: Some(reading.lane_index),
                streak: Some(state.run),
                ..Default::default()
            },
        })
    }

    pub fn evict(&mut self, id: TrackId) {
        self.state.remove(&id);
    }

    pub fn tracked(&self) -> usize {
        self.state.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BBox, MotionVector, TrackState};

    fn snapshot(id: TrackId, frame: u64, cx: f64, motion: MotionVector) -> TrackSnapshot {
        TrackSnapshot {
            id,
            class_label: "car".to_string(),
            state: TrackState::Confirmed,
            bbox: BBox::centered(cx, 0.5, 0.1, 0.1),
            confidence: 0.9,
            motion,
            age: frame as u32,
            misses: 0,
            hit_streak: frame as u32 + 1,
            matched: true,
            frame_index: frame,
            timestamp: frame as f64 / 30.0,
            history: Vec::new(),
        }
    }

    /// Lane 1 expects 90 degrees; heading 130 degrees deviates by 40
    fn deviating() -> MotionVector {
        let rad = 130f64.to_radians();
        MotionVector::new(0.01 * rad.cos(), 0.01 * rad.sin())
    }

    fn conforming() -> MotionVector {
        MotionVector::new(0.0, 0.01)
    }

    fn rule() -> LaneRule {
        LaneRule::new(LaneConfig::default())
    }

    #[test]
    fn test_lane_index_from_boundaries() {
        let custom = LaneRule::new(LaneConfig {
            boundaries: vec![0.3, 0.6],
            headings_deg: vec![270.0, 270.0, 90.0],
            ..Default::default()
        });
        assert_eq!(custom.lane_index(0.1), 0);
        assert_eq!(custom.lane_index(0.3), 1);
        assert_eq!(custom.lane_index(0.9), 2);

        // empty boundaries split the frame in half
        assert_eq!(rule().lane_index(0.49), 0);
        assert_eq!(rule().lane_index(0.51), 1);
    }

    #[test]
    fn test_fires_once_at_m_consecutive() {
        let classes = ClassConfig::default();
        let mut ledger = CooldownLedger::new();
        let mut rule = rule();

        let mut fired = Vec::new();
        for frame in 0..20 {
            if rule
                .evaluate(&snapshot(1, frame, 0.7, deviating()), &classes, &mut ledger)
                .is_some()
            {
                fired.push(frame);
            }
        }
        assert_eq!(fired, vec![4]);
    }

    #[test]
    fn test_short_run_never_fires() {
        let classes = ClassConfig::default();
        let mut ledger = CooldownLedger::new();
        let mut rule = rule();

        for round in 0..5u64 {
            for i in 0..4 {
                let frame = round * 5 + i;
                assert!(rule
                    .evaluate(&snapshot(1, frame, 0.7, deviating()), &classes, &mut ledger)
                    .is_none());
            }
            assert!(rule
                .evaluate(&snapshot(1, round * 5 + 4, 0.7, conforming()), &classes, &mut ledger)
                .is_none());
        }
    }

    #[test]
    fn test_abstains_when_slow_or_unconfirmed() {
        let classes = ClassConfig::default();
        let mut ledger = CooldownLedger::new();
        let mut rule = rule();

        let slow = MotionVector::new(-0.0001, 0.0);
        assert!(rule.reading(&snapshot(1, 0, 0.7, slow)).is_none());

        let mut tentative = snapshot(2, 0, 0.7, deviating());
        tentative.state = TrackState::Tentative;
        for _ in 0..10 {
            assert!(rule.evaluate(&tentative, &classes, &mut ledger).is_none());
        }

        let mut person = snapshot(3, 0, 0.7, deviating());
        person.class_label = "person".to_string();
        assert!(rule.evaluate(&person, &classes, &mut ledger).is_none());
    }

    #[test]
    fn test_low_confidence_detections_are_not_judged() {
        let classes = ClassConfig::default();
        let mut ledger = CooldownLedger::new();
        let mut rule = rule();

        let unsure = |frame: u64| {
            let mut track = snapshot(1, frame, 0.7, deviating());
            track.confidence = 0.6;
            track
        };
        for frame in 0..10 {
            assert!(rule.evaluate(&unsure(frame), &classes, &mut ledger).is_none());
        }

        // a doubtful frame in the middle of a run starts it over
        let mut fired = Vec::new();
        for frame in 10..30 {
            let track = if frame == 13 {
                unsure(frame)
            } else {
                snapshot(1, frame, 0.7, deviating())
            };
            if rule.evaluate(&track, &classes, &mut ledger).is_some() {
                fired.push(frame);
            }
        }
        assert_eq!(fired, vec![18]);
    }

    #[test]
    fn test_gap_resets_run() {
        let classes = ClassConfig::default();
        let mut ledger = CooldownLedger::new();
        let mut rule = rule();

        for frame in [0, 1, 2, 3, 5, 6, 7, 8] {
            assert!(rule
                .evaluate(&snapshot(1, frame, 0.7, deviating()), &classes, &mut ledger)
                .is_none());
        }
        assert!(rule
            .evaluate(&snapshot(1, 9, 0.7, deviating()), &classes, &mut ledger)
            .is_some());
    }

    #[test]
    fn test_recovery_and_cooldown_gate_refire() {
        let classes = ClassConfig::default();
        let mut ledger = CooldownLedger::new();
        let mut rule = LaneRule::new(LaneConfig {
            cooldown_frames: 30,
            ..Default::default()
        });

        let mut frame = 0;
        let mut fired = Vec::new();
        let mut step = |motion: MotionVector, rule: &mut LaneRule, ledger: &mut CooldownLedger| {
            if rule
                .evaluate(&snapshot(1, frame, 0.7, motion), &classes, ledger)
                .is_some()
            {
                fired.push(frame);
            }
            frame += 1;
        };

        for _ in 0..5 {
            step(deviating(), &mut rule, &mut ledger);
        }
        // latched: recovery of 10 frames, then deviate again inside the cooldown
        for _ in 0..10 {
            step(conforming(), &mut rule, &mut ledger);
        }
        for _ in 0..10 {
            step(deviating(), &mut rule, &mut ledger);
        }
        // run reaches M again at 19, but the ledger holds it until frame 34
        for _ in 0..10 {
            step(deviating(), &mut rule, &mut ledger);
        }
        assert_eq!(fired, vec![4, 34]);
    }

    #[test]
    fn test_evict_forgets_track() {
        let classes = ClassConfig::default();
        let mut ledger = CooldownLedger::new();
        let mut rule = rule();
        rule.evaluate(&snapshot(1, 0, 0.7, deviating()), &classes, &mut ledger);
        assert_eq!(rule.tracked(), 1);
        rule.evict(1);
        assert_eq!(rule.tracked(), 0);
    }
}

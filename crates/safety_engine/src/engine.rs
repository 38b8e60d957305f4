//! FrameProcessor - tracker update, rule evaluation and publish for one frame

use std::sync::Arc;
use std::time::Instant;

use contracts::{ClassConfig, FrameDetections, SafetyConfig, SafetyEvent};
use event_bus::EventBus;
use observability::{EngineMetricsAggregator, MetricsSummary};
use tracing::{debug, instrument};
use tracker::{Tracker, TrackerStats};

use crate::cooldown::CooldownLedger;
use crate::emergency::EmergencyRule;
use crate::hazard::HazardRule;
use crate::lane::LaneRule;
use crate::EngineError;

/// Drives one camera's detections through the tracker and the rule set
///
/// Frames must be fed in order by a single caller. Events are published to
/// the bus before `process` returns.
pub struct FrameProcessor {
    camera_id: String,
    classes: ClassConfig,
    tracker: Tracker,
    lane: LaneRule,
    emergency: EmergencyRule,
    hazard: HazardRule,
    ledger: CooldownLedger,
    bus: Arc<EventBus>,
    aggregator: EngineMetricsAggregator,
    live_tracks: usize,
}

impl FrameProcessor {
    pub fn new(config: &SafetyConfig, bus: Arc<EventBus>) -> Self {
        Self {
            camera_id: config.source.camera_id.clone(),
            classes: config.classes.clone(),
            tracker: Tracker::new(config.tracker.clone(), config.classes.clone()),
            lane: LaneRule::new(config.lane.clone()),
            emergency: EmergencyRule::new(config.emergency.clone()),
            hazard: HazardRule::new(config.hazard.clone()),
            ledger: CooldownLedger::new(),
            bus,
            aggregator: EngineMetricsAggregator::new(),
            live_tracks: 0,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Process one frame and return the events that were published
    ///
    /// # Errors
    /// Every error is fatal for this pipeline instance: tracker or rule
    /// invariant violations, or a closed bus.
    #[instrument(
        name = "frame_process",
        skip(self, frame),
        fields(frame_index = frame.frame_index, camera = %self.camera_id)
    )]
    pub fn process(&mut self, frame: &FrameDetections) -> Result<Vec<SafetyEvent>, EngineError> {
        let started = Instant::now();

        let update = self.tracker.update(frame)?;

        for id in &update.deleted {
            self.lane.evict(*id);
            self.ledger.evict_track(*id);
        }

        let mut candidates = Vec::new();
        for track in update.matched() {
            candidates.extend(self.lane.evaluate(track, &self.classes, &mut self.ledger));
            candidates.extend(self.emergency.evaluate(track, &self.classes, &mut self.ledger));
        }

        let expired = self.hazard.expire(frame.frame_index, &mut self.ledger);
        if expired > 0 {
            debug!(expired, "Hazard clusters expired");
        }
        candidates.extend(
            self.hazard
                .evaluate(&update.hazards, frame.frame_index, &mut self.ledger)?,
        );

        let events: Vec<SafetyEvent> = candidates
            .into_iter()
            .map(|c| c.into_event(&self.camera_id, frame.frame_index, frame.timestamp))
            .collect();

        for event in &events {
            self.bus.publish(event)?;
            observability::record_event_published(event);
            self.aggregator.record_event(event);
        }

        self.live_tracks = update.tracks.len();
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability::record_detections(update.accepted, update.malformed, update.below_floor);
        observability::record_frame_processed(frame.frame_index, self.live_tracks, latency_ms);
        self.aggregator
            .record_detections(update.accepted, update.malformed, update.below_floor);
        self.aggregator.record_frame(self.live_tracks, latency_ms);

        Ok(events)
    }

    /// Live tracks after the last processed frame
    pub fn live_tracks(&self) -> usize {
        self.live_tracks
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    pub fn summary(&self) -> MetricsSummary {
        self.aggregator.summary()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

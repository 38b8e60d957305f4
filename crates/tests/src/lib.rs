//! # Integration Tests
//!
//! Cross-crate scenarios for the safety pipeline.
//!
//! - Rule behaviour end to end (tracker -> rules -> bus)
//! - Sink delivery on shutdown and subscriber isolation
//! - Producer / bounded queue / frame loop wiring

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};

    use contracts::{BBox, Detection, FrameDetections, SafetyConfig, SafetyEvent, TrackerConfig};
    use event_bus::{EventBus, FnSubscriber};

    pub fn config() -> SafetyConfig {
        SafetyConfig {
            tracker: TrackerConfig {
                confirm_hits: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Bus with one subscriber that records every event
    pub fn collecting_bus(config: &SafetyConfig) -> (Arc<EventBus>, Arc<Mutex<Vec<SafetyEvent>>>) {
        let bus = Arc::new(EventBus::new(&config.bus));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(Arc::new(FnSubscriber::new("collect", move |e: &SafetyEvent| {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        })));
        (bus, seen)
    }

    /// A car in the right-hand lane moving up the frame (against its 90 degree heading)
    pub fn wrong_way_frame(frame: u64) -> FrameDetections {
        let cy = 0.8 - frame as f64 * 0.01;
        FrameDetections::new(
            frame,
            frame as f64 / 30.0,
            vec![Detection::new("car", 0.9, BBox::centered(0.7, cy, 0.08, 0.06))],
        )
    }

    pub fn pothole_frame(frame: u64) -> FrameDetections {
        FrameDetections::new(
            frame,
            frame as f64 / 30.0,
            vec![Detection::new("pothole", 0.7, BBox::centered(0.3, 0.8, 0.25, 0.2))],
        )
    }
}

#[cfg(test)]
mod rule_tests {
    use contracts::{BBox, Detection, EventType, FrameDetections, Severity};
    use safety_engine::{severity_for_area, FrameProcessor};

    use crate::support::*;

    #[test]
    fn test_wrong_way_reported_once_over_long_run() {
        let config = config();
        let (bus, seen) = collecting_bus(&config);
        let mut processor = FrameProcessor::new(&config, bus);

        let mut fired_at = Vec::new();
        for frame in 1..=40u64 {
            if !processor.process(&wrong_way_frame(frame)).unwrap().is_empty() {
                fired_at.push(frame);
            }
        }

        // confirmed on frame 2, five deviating evaluations -> frame 6
        assert_eq!(fired_at, vec![6]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type, EventType::LaneViolation);
        assert_eq!(seen[0].severity, Severity::High);
        assert!(seen[0].payload.deviation_deg.unwrap() > config.lane.deviation_threshold_deg);
    }

    #[test]
    fn test_short_deviation_raises_nothing() {
        let config = config();
        let (bus, seen) = collecting_bus(&config);
        let mut processor = FrameProcessor::new(&config, bus);

        // four deviating evaluations (frames 2..=5), then the car leaves
        for frame in 1..=5u64 {
            processor.process(&wrong_way_frame(frame)).unwrap();
        }
        for frame in 6..=20u64 {
            processor
                .process(&FrameDetections::new(frame, frame as f64 / 30.0, vec![]))
                .unwrap();
        }

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_persistent_hazard_reported_once_within_cooldown() {
        let mut config = config();
        config.hazard.cooldown_frames = 300;
        let (bus, seen) = collecting_bus(&config);
        let mut processor = FrameProcessor::new(&config, bus);

        for frame in 1..=10u64 {
            processor.process(&pothole_frame(frame)).unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type, EventType::Hazard);
        assert_eq!(seen[0].track_id, None);
        // 0.25 * 0.2 = 0.05 of the frame
        assert_eq!(seen[0].severity, Severity::Medium);
    }

    #[test]
    fn test_severity_table() {
        let (t1, t2) = (0.03, 0.1);
        let severities: Vec<_> = [0.01, 0.05, 0.2]
            .iter()
            .map(|a| severity_for_area(*a, t1, t2))
            .collect();
        assert_eq!(severities, vec![Severity::Low, Severity::Medium, Severity::High]);
    }

    #[test]
    fn test_forty_degree_deviation_fires_on_fifth_qualifying_frame() {
        let config = config();
        let (bus, seen) = collecting_bus(&config);
        let mut processor = FrameProcessor::new(&config, bus);

        // right lane expects 90 degrees; travel at 130 degrees
        let heading = 130f64.to_radians();
        let (dx, dy) = (heading.cos() * 0.01, heading.sin() * 0.01);
        let mut fired_at = Vec::new();
        for frame in 1..=12u64 {
            let step = frame as f64;
            let det = Detection::new(
                "car",
                0.9,
                BBox::centered(0.8 + dx * step, 0.3 + dy * step, 0.08, 0.06),
            );
            let events = processor
                .process(&FrameDetections::new(frame, step / 30.0, vec![det]))
                .unwrap();
            if !events.is_empty() {
                fired_at.push(frame);
            }
        }

        // first qualifying evaluation is frame 2, when the track confirms
        assert_eq!(fired_at, vec![6]);
        let seen = seen.lock().unwrap();
        let deviation = seen[0].payload.deviation_deg.unwrap();
        assert!((deviation - 40.0).abs() < 1e-6, "{deviation}");
    }

    #[test]
    fn test_events_carry_camera_and_unique_ids() {
        let config = config();
        let (bus, seen) = collecting_bus(&config);
        let mut processor = FrameProcessor::new(&config, bus);

        for frame in 1..=12u64 {
            let mut detections = wrong_way_frame(frame).detections;
            detections.extend(pothole_frame(frame).detections);
            processor
                .process(&FrameDetections::new(frame, frame as f64 / 30.0, detections))
                .unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.camera_id == config.source.camera_id));
        assert_ne!(seen[0].event_id, seen[1].event_id);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use contracts::{ClassConfig, TrackState, TrackerConfig};
    use tracker::Tracker;

    use crate::support::*;

    #[test]
    fn test_track_states_never_move_backwards() {
        let config = TrackerConfig {
            confirm_hits: 2,
            max_misses: 2,
            lost_grace_frames: 3,
            ..Default::default()
        };
        let mut tracker = Tracker::new(config, ClassConfig::default());

        let mut last_rank = 0;
        let mut seen_states = Vec::new();
        let mut deleted = false;
        for frame in 1..=20u64 {
            let mut input = wrong_way_frame(frame);
            // visible for 6 frames, then a gap, then back in the same spot
            if !(1..=6).contains(&frame) && frame < 15 {
                input.detections.clear();
            }
            let update = tracker.update(&input).unwrap();
            if let Some(track) = update.tracks.iter().find(|t| t.id == 1) {
                assert!(track.state.rank() >= last_rank);
                last_rank = track.state.rank();
                if seen_states.last() != Some(&track.state) {
                    seen_states.push(track.state);
                }
            }
            deleted |= update.deleted.contains(&1);
        }

        assert_eq!(
            seen_states,
            vec![TrackState::Tentative, TrackState::Confirmed, TrackState::Lost]
        );
        assert!(deleted);
    }
}

#[cfg(test)]
mod delivery_tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        BusConfig, ContractError, DedupKey, EventPayload, EventSink, EventType, SafetyEvent,
        Severity, SinkConfig, SinkType,
    };
    use event_bus::{EventBus, EventBusBuilder, FnSubscriber, SinkHandle};
    use tempfile::tempdir;

    /// Queue-backed sink that records what it was handed, a little slowly
    #[derive(Clone, Default)]
    struct RecordingSink {
        seen: Arc<Mutex<Vec<SafetyEvent>>>,
        closed: Arc<AtomicBool>,
    }

    impl EventSink for RecordingSink {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn write(&mut self, event: &SafetyEvent) -> Result<(), ContractError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(track: u64) -> SafetyEvent {
        SafetyEvent::new(
            DedupKey::track(track, EventType::LaneViolation),
            "CAM_01",
            track,
            track as f64 / 30.0,
            Severity::High,
            EventPayload::default(),
        )
    }

    #[tokio::test]
    async fn test_queued_events_reach_every_sink_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let bus = EventBusBuilder::new(BusConfig::default())
            .with_sinks(vec![SinkConfig::new("event_log", SinkType::File)
                .with_param("path", path.to_string_lossy())])
            .build()
            .await
            .unwrap();
        let recorder = RecordingSink::default();
        bus.subscribe_queued(SinkHandle::spawn(recorder.clone(), 8));

        let sent: Vec<_> = (1..=3).map(event).collect();
        for e in &sent {
            let report = bus.publish(e).unwrap();
            assert_eq!(report.delivered, 2);
        }
        // publish only enqueues; the slow sink is still behind here
        bus.close().await;

        assert_eq!(*recorder.seen.lock().unwrap(), sent);
        assert!(recorder.closed.load(Ordering::SeqCst));

        let content = std::fs::read_to_string(&path).unwrap();
        let written: Vec<SafetyEvent> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(written, sent);
        assert!(bus.publish(&event(4)).is_err());
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let bus = EventBus::new(&BusConfig::default());
        let counts: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();

        bus.subscribe(Arc::new(FnSubscriber::new("broken", |_: &SafetyEvent| {
            Err(ContractError::sink_write("broken", "disk full"))
        })));
        for (i, count) in counts.iter().enumerate() {
            let count = Arc::clone(count);
            bus.subscribe(Arc::new(FnSubscriber::new(format!("ok_{i}"), move |_: &SafetyEvent| {
                count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })));
        }

        for track in 1..=5 {
            let report = bus.publish(&event(track)).unwrap();
            assert_eq!(report.delivered, 3);
            assert_eq!(report.failed, 1);
        }

        for count in &counts {
            assert_eq!(count.load(Ordering::Relaxed), 5);
        }
        assert_eq!(bus.metrics().failed, 5);
    }
}

#[cfg(test)]
mod ingestion_tests {
    use std::sync::Arc;

    use contracts::{FrameDetections, QueueConfig};
    use ingestion::{detection_queue, spawn_producer, IngestionError, IngestionMetrics, MockSource};
    use safety_engine::FrameProcessor;

    use crate::support::*;

    #[test]
    fn test_producer_feeds_processor_in_order() {
        let config = config();
        let (bus, seen) = collecting_bus(&config);
        let mut processor = FrameProcessor::new(&config, bus);

        let frames: Vec<FrameDetections> = (1..=30u64).map(wrong_way_frame).collect();
        let metrics = Arc::new(IngestionMetrics::new());
        let queue = QueueConfig {
            capacity: 4,
            send_timeout_ms: 5_000,
        };
        let (tx, rx) = detection_queue(&queue, Arc::clone(&metrics));
        let producer = spawn_producer(Box::new(MockSource::new("mock", frames)), tx, None).unwrap();

        let mut last = 0;
        while let Some(frame) = rx.recv_blocking() {
            assert!(frame.frame_index > last);
            last = frame.frame_index;
            processor.process(&frame).unwrap();
        }

        let report = producer.join().unwrap();
        assert_eq!(report.frames_sent, 30);
        assert_eq!(last, 30);
        assert_eq!(metrics.snapshot().frames_dequeued, 30);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stalled_consumer_surfaces_overflow() {
        let metrics = Arc::new(IngestionMetrics::new());
        let queue = QueueConfig {
            capacity: 2,
            send_timeout_ms: 20,
        };
        let (tx, rx) = detection_queue(&queue, Arc::clone(&metrics));
        let source = MockSource::generate("mock", 10, 30.0, |_| Vec::new());
        let producer = spawn_producer(Box::new(source), tx, None).unwrap();

        // nobody reads; the third send times out
        let err = producer.join().unwrap_err();
        assert!(matches!(err, IngestionError::QueueOverflow { frame_index: 2, .. }));
        assert!(err.is_fatal());
        assert_eq!(rx.len(), 2);
        assert_eq!(metrics.snapshot().overflows, 1);
    }
}

#[cfg(test)]
mod config_tests {
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::EventType;
    use event_bus::EventBus;
    use safety_engine::FrameProcessor;

    use crate::support::*;

    const THREE_LANES: &str = r#"
[source]
camera_id = "CAM_04"

[tracker]
confirm_hits = 2

[lane]
boundaries = [0.4, 0.6]
headings_deg = [270.0, 0.0, 90.0]
violation_frames = 3
"#;

    #[test]
    fn test_loaded_layout_drives_the_lane_rule() {
        let config = ConfigLoader::load_from_str(THREE_LANES, ConfigFormat::Toml).unwrap();
        assert_eq!(config.lane.lane_count(), 3);

        let (bus, seen) = collecting_bus(&config);
        let mut processor = FrameProcessor::new(&config, bus);
        for frame in 1..=10u64 {
            processor.process(&wrong_way_frame(frame)).unwrap();
        }

        // confirmed on frame 2, three deviating evaluations -> frame 4
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type, EventType::LaneViolation);
        assert_eq!(seen[0].frame_index, 4);
        assert_eq!(seen[0].camera_id, "CAM_04");
        assert_eq!(seen[0].payload.expected_heading_deg, Some(90.0));
    }

    #[test]
    fn test_invalid_layout_never_reaches_the_engine() {
        let broken = THREE_LANES.replace("[270.0, 0.0, 90.0]", "[270.0, 90.0]");
        assert!(ConfigLoader::load_from_str(&broken, ConfigFormat::Toml).is_err());

        // the defaults always build a working processor
        let config = ConfigLoader::load_or_default(None).unwrap();
        let bus = Arc::new(EventBus::new(&config.bus));
        let processor = FrameProcessor::new(&config, bus);
        assert_eq!(processor.camera_id(), config.source.camera_id);
    }
}

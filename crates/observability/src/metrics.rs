//! Engine metrics collection
//!
//! Thin wrappers over the `metrics` facade plus an in-memory aggregator for
//! end-of-run summaries.

use std::collections::BTreeMap;

use contracts::{EventType, SafetyEvent};
use metrics::{counter, gauge, histogram};

/// Record one processed frame
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_frame_processed;
///
/// let started = Instant::now();
/// let events = processor.process(&frame)?;
/// record_frame_processed(frame.frame_index, live_tracks, started.elapsed().as_secs_f64() * 1000.0);
/// ```
pub fn record_frame_processed(frame_index: u64, live_tracks: usize, latency_ms: f64) {
    counter!("traffic_guard_frames_total").increment(1);
    gauge!("traffic_guard_last_frame_index").set(frame_index as f64);
    gauge!("traffic_guard_live_tracks").set(live_tracks as f64);
    histogram!("traffic_guard_frame_latency_ms").record(latency_ms);
}

/// Record detection triage outcome for one frame
pub fn record_detections(accepted: usize, malformed: usize, below_floor: usize) {
    counter!("traffic_guard_detections_accepted_total").increment(accepted as u64);
    if malformed > 0 {
        counter!("traffic_guard_detections_malformed_total").increment(malformed as u64);
    }
    if below_floor > 0 {
        counter!("traffic_guard_detections_below_floor_total").increment(below_floor as u64);
    }
}

/// Record a published safety event
pub fn record_event_published(event: &SafetyEvent) {
    counter!(
        "traffic_guard_events_total",
        "type" => event.event_type.as_str(),
        "severity" => event.severity.to_string()
    )
    .increment(1);
}

/// Record a subscriber failure isolated by the bus
pub fn record_subscriber_failure(subscriber: &str, kind: &'static str) {
    counter!(
        "traffic_guard_subscriber_failures_total",
        "subscriber" => subscriber.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Record a handler call that exceeded the slow-subscriber threshold
pub fn record_slow_subscriber(subscriber: &str, elapsed_ms: f64) {
    counter!(
        "traffic_guard_slow_subscriber_total",
        "subscriber" => subscriber.to_string()
    )
    .increment(1);
    histogram!(
        "traffic_guard_slow_subscriber_ms",
        "subscriber" => subscriber.to_string()
    )
    .record(elapsed_ms);
}

/// Record a sink write outcome
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "traffic_guard_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record an event dropped by a queued sink after its enqueue deadline
pub fn record_sink_dropped(sink_name: &str) {
    counter!(
        "traffic_guard_sink_dropped_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// Record detection queue depth
pub fn record_queue_depth(depth: usize) {
    gauge!("traffic_guard_detection_queue_depth").set(depth as f64);
}

/// Engine metrics aggregator
///
/// Aggregates in memory for the end-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct EngineMetricsAggregator {
    pub total_frames: u64,
    pub detections_accepted: u64,
    pub detections_malformed: u64,
    pub detections_below_floor: u64,
    pub frame_latency_ms: RunningStats,
    pub live_tracks: RunningStats,
    pub events_by_type: BTreeMap<EventType, u64>,
}

impl EngineMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, live_tracks: usize, latency_ms: f64) {
        self.total_frames += 1;
        self.live_tracks.push(live_tracks as f64);
        self.frame_latency_ms.push(latency_ms);
    }

    pub fn record_detections(&mut self, accepted: usize, malformed: usize, below_floor: usize) {
        self.detections_accepted += accepted as u64;
        self.detections_malformed += malformed as u64;
        self.detections_below_floor += below_floor as u64;
    }

    pub fn record_event(&mut self, event: &SafetyEvent) {
        *self.events_by_type.entry(event.event_type).or_insert(0) += 1;
    }

    pub fn total_events(&self) -> u64 {
        self.events_by_type.values().sum()
    }

    pub fn summary(&self) -> MetricsSummary {
        let dropped = self.detections_malformed;
        let seen = self.detections_accepted + self.detections_malformed + self.detections_below_floor;
        MetricsSummary {
            total_frames: self.total_frames,
            detections_accepted: self.detections_accepted,
            detections_malformed: self.detections_malformed,
            detections_below_floor: self.detections_below_floor,
            malformed_rate: if seen > 0 {
                dropped as f64 / seen as f64 * 100.0
            } else {
                0.0
            },
            frame_latency_ms: StatsSummary::from(&self.frame_latency_ms),
            live_tracks: StatsSummary::from(&self.live_tracks),
            events_by_type: self.events_by_type.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub detections_accepted: u64,
    pub detections_malformed: u64,
    pub detections_below_floor: u64,
    pub malformed_rate: f64,
    pub frame_latency_ms: StatsSummary,
    pub live_tracks: StatsSummary,
    pub events_by_type: BTreeMap<EventType, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Engine Metrics Summary ===")?;
        writeln!(f, "Total frames: {}", self.total_frames)?;
        writeln!(f, "Detections accepted: {}", self.detections_accepted)?;
        writeln!(
            f,
            "Detections malformed: {} ({:.2}%)",
            self.detections_malformed, self.malformed_rate
        )?;
        writeln!(f, "Detections below floor: {}", self.detections_below_floor)?;
        writeln!(f, "Frame latency (ms): {}", self.frame_latency_ms)?;
        writeln!(f, "Live tracks: {}", self.live_tracks)?;

        if !self.events_by_type.is_empty() {
            writeln!(f, "Events:")?;
            for (event_type, count) in &self.events_by_type {
                writeln!(f, "  {}: {}", event_type, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

//! Pipeline statistics and metrics.

use std::time::Duration;

use event_bus::{BusMetricsSnapshot, MetricsSnapshot as SinkSnapshot};
use ingestion::{MetricsSnapshot as IngestionSnapshot, ProducerReport};
use observability::MetricsSummary;
use tracker::TrackerStats;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Frames the engine processed
    pub frames_processed: u64,

    /// Events published to the bus
    pub events_published: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Set when the run ended on a signal or timeout
    pub interrupted: bool,

    /// None when the producer had to be abandoned mid-read
    pub producer: Option<ProducerReport>,

    pub ingestion: IngestionSnapshot,

    pub tracker: TrackerStats,

    pub engine: MetricsSummary,

    pub bus: BusMetricsSnapshot,

    /// Per queued sink: (name, counters)
    pub sinks: Vec<(String, SinkSnapshot)>,
}

impl PipelineStats {
    /// Calculate frames per second throughput
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames_processed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Events the sinks accepted but could not deliver
    pub fn undelivered(&self) -> u64 {
        self.sinks
            .iter()
            .map(|(_, s)| s.failure_count + s.dropped_count)
            .sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Frames processed: {}", self.frames_processed);
        println!("   ├─ FPS: {:.2}", self.fps());
        println!("   ├─ Events published: {}", self.events_published);
        println!("   └─ Interrupted: {}", if self.interrupted { "yes" } else { "no" });

        println!("\n📥 Ingestion");
        println!("   ├─ Frames read: {}", self.ingestion.frames_read);
        println!("   ├─ Frames enqueued: {}", self.ingestion.frames_enqueued);
        println!("   ├─ Parse errors: {}", self.ingestion.parse_errors);
        match &self.producer {
            Some(report) => println!(
                "   └─ Producer: {} sent, {} skipped{}",
                report.frames_sent,
                report.parse_errors,
                if report.interrupted { ", interrupted" } else { "" }
            ),
            None => println!("   └─ Producer: abandoned while reading"),
        }

        println!("\n🚗 Tracker");
        println!("   ├─ Detections accepted: {}", self.tracker.detections_accepted);
        println!("   ├─ Detections malformed: {}", self.tracker.detections_malformed);
        println!("   ├─ Below confidence floor: {}", self.tracker.detections_below_floor);
        println!("   ├─ Hazard detections: {}", self.tracker.hazard_detections);
        println!(
            "   └─ Tracks: {} created, {} confirmed, {} deleted",
            self.tracker.tracks_created, self.tracker.tracks_confirmed, self.tracker.tracks_deleted
        );

        println!("\n⚠️  Events");
        if self.engine.events_by_type.is_empty() {
            println!("   └─ none");
        } else {
            let last = self.engine.events_by_type.len() - 1;
            for (i, (event_type, count)) in self.engine.events_by_type.iter().enumerate() {
                let prefix = if i == last { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, event_type, count);
            }
        }
        println!(
            "   Frame latency: mean {:.3}ms, max {:.3}ms",
            self.engine.frame_latency_ms.mean, self.engine.frame_latency_ms.max
        );

        println!("\n📤 Delivery");
        println!("   ├─ Handler calls: {} ok, {} failed, {} panicked", self.bus.delivered, self.bus.failed, self.bus.panicked);
        println!("   └─ Slow handler calls: {}", self.bus.slow);
        for (name, sink) in &self.sinks {
            println!(
                "      • {}: {} written, {} failed, {} dropped",
                name, sink.write_count, sink.failure_count, sink.dropped_count
            );
        }

        println!();
    }
}

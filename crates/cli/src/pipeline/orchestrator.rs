//! Pipeline orchestrator: producer thread -> bounded queue -> frame loop -> bus.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use contracts::SafetyConfig;
use event_bus::{create_event_bus, EventBus};
use ingestion::{
    detection_queue, spawn_producer, DetectionReceiver, DetectionSource, IngestionError,
    IngestionMetrics, JsonlSource, ProducerHandle, ProducerReport,
};
use safety_engine::{EngineError, FrameProcessor};

use super::stats::PipelineStats;
use crate::error::CliError;

/// How long to wait for the producer thread after stop before giving up on it
const PRODUCER_JOIN_GRACE: Duration = Duration::from_secs(2);

/// Where the producer reads detections from
#[derive(Debug, Clone)]
pub enum SourceSelection {
    /// Live camera feed on stdin
    Camera(u32),
    /// Recorded detection log
    File(PathBuf),
}

impl SourceSelection {
    fn open(&self) -> Result<Box<dyn DetectionSource>> {
        Ok(match self {
            Self::Camera(index) => Box::new(JsonlSource::stdin(*index)),
            Self::File(path) => Box::new(
                JsonlSource::open(path)
                    .with_context(|| format!("Failed to open detection log: {}", path.display()))?,
            ),
        })
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub safety: SafetyConfig,
    pub source: SourceSelection,
    /// Maximum frames to read (None = unlimited)
    pub max_frames: Option<u64>,
    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,
    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// What the frame loop hands back when it ends
struct FrameLoopOutcome {
    processor: FrameProcessor,
    frames: u64,
    events: u64,
    error: Option<EngineError>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the source is exhausted, `shutdown` resolves, or the timeout passes
    ///
    /// On every exit path the producer is stopped, frames already queued are
    /// processed, and the bus is closed so queued sinks flush before returning.
    #[instrument(name = "pipeline_run", skip(self, shutdown), fields(camera = %self.config.safety.source.camera_id))]
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start = Instant::now();
        let config = self.config;

        if let Some(port) = config.metrics_port {
            observability::init_metrics_only(port)?;
        }

        let enabled_sinks: Vec<_> = config
            .safety
            .sinks
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        info!(sinks = enabled_sinks.len(), "Creating event bus");
        let bus = Arc::new(
            create_event_bus(config.safety.bus.clone(), enabled_sinks)
                .await
                .context("Failed to create event bus")?,
        );

        let ingestion_metrics = Arc::new(IngestionMetrics::new());
        let (tx, rx) = detection_queue(&config.safety.queue, Arc::clone(&ingestion_metrics));

        let source = match config.source.open() {
            Ok(source) => source,
            Err(e) => {
                bus.close().await;
                return Err(e);
            }
        };
        info!(source = source.name(), capacity = tx.capacity(), "Starting producer");
        let producer = spawn_producer(source, tx, config.max_frames)
            .context("Failed to spawn detection producer")?;

        let processor = FrameProcessor::new(&config.safety, Arc::clone(&bus));
        let mut consumer = tokio::task::spawn_blocking(move || frame_loop(processor, rx));

        let deadline = async {
            match config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        let mut interrupted = false;
        let joined = tokio::select! {
            res = &mut consumer => Some(res),
            _ = &mut shutdown => {
                warn!("Shutdown signal received, draining queued frames");
                interrupted = true;
                None
            }
            _ = &mut deadline => {
                warn!("Pipeline timeout reached, draining queued frames");
                interrupted = true;
                None
            }
        };

        producer.stop();
        let outcome = match joined {
            Some(res) => res,
            None => consumer.await,
        }
        .context("Frame loop task panicked")?;

        let producer_result = finish_producer(producer).await;

        info!("Closing event bus");
        bus.close().await;

        let stats = collect_stats(&outcome, &bus, &ingestion_metrics, &producer_result, start, interrupted);

        if let Some(e) = outcome.error {
            return Err(CliError::pipeline_fatal(e.to_string()).into());
        }
        if let Some(Err(e)) = producer_result {
            if e.is_fatal() {
                return Err(CliError::pipeline_fatal(e.to_string()).into());
            }
            warn!(error = %e, "Producer ended with a non-fatal error");
        }

        info!(
            frames = stats.frames_processed,
            events = stats.events_published,
            fps = %format!("{:.2}", stats.fps()),
            "Pipeline completed"
        );
        Ok(stats)
    }
}

/// Blocking consumer: processes frames in order until the queue drains or a fatal error
fn frame_loop(mut processor: FrameProcessor, rx: DetectionReceiver) -> FrameLoopOutcome {
    let mut frames = 0;
    let mut events = 0;
    let mut failure = None;

    while let Some(frame) = rx.recv_blocking() {
        match processor.process(&frame) {
            Ok(published) => {
                frames += 1;
                events += published.len() as u64;
            }
            Err(e) => {
                error!(frame_index = frame.frame_index, error = %e, "Fatal error in frame loop");
                rx.close();
                failure = Some(e);
                break;
            }
        }
    }

    FrameLoopOutcome {
        processor,
        frames,
        events,
        error: failure,
    }
}

/// Join the producer once it has noticed the stop, or abandon it if it is stuck in a read
async fn finish_producer(producer: ProducerHandle) -> Option<Result<ProducerReport, IngestionError>> {
    let deadline = Instant::now() + PRODUCER_JOIN_GRACE;
    while !producer.is_finished() {
        if Instant::now() >= deadline {
            warn!("Producer still blocked on its source, abandoning thread");
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Some(producer.join())
}

fn collect_stats(
    outcome: &FrameLoopOutcome,
    bus: &EventBus,
    ingestion: &IngestionMetrics,
    producer: &Option<Result<ProducerReport, IngestionError>>,
    start: Instant,
    interrupted: bool,
) -> PipelineStats {
    PipelineStats {
        frames_processed: outcome.frames,
        events_published: outcome.events,
        duration: start.elapsed(),
        interrupted,
        producer: match producer {
            Some(Ok(report)) => Some(*report),
            Some(Err(_)) => Some(ProducerReport::default()),
            None => None,
        },
        ingestion: ingestion.snapshot(),
        tracker: outcome.processor.tracker_stats(),
        engine: outcome.processor.summary(),
        bus: bus.metrics(),
        sinks: bus.sink_metrics(),
    }
}

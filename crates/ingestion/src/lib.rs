//! # Ingestion
//!
//! Detection intake for the safety pipeline.
//!
//! Responsibilities:
//! - Read per-frame detection batches from a source (JSONL replay, camera
//!   bridge on stdin, scripted mock)
//! - Feed them through a bounded queue with blocking backpressure
//! - Surface a queue that stays full past the hard timeout as an error
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{detection_queue, spawn_producer, IngestionMetrics, JsonlSource};
//!
//! let (tx, rx) = detection_queue(&config.queue, Arc::new(IngestionMetrics::new()));
//! let producer = spawn_producer(Box::new(JsonlSource::open("detections.jsonl")?), tx, None)?;
//!
//! while let Some(frame) = rx.recv_blocking() {
//!     processor.process(&frame)?;
//! }
//! producer.join()?;
//! ```

mod error;
mod metrics;
mod producer;
mod queue;
mod source;

// Re-exports
pub use error::{IngestionError, Result};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use producer::{spawn_producer, ProducerHandle, ProducerReport};
pub use queue::{detection_queue, DetectionReceiver, DetectionSender};
pub use source::{camera_id, DetectionSource, JsonlSource, MockSource};

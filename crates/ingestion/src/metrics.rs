//! Ingestion counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Shared between the producer and the consumer side of the queue
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Frames read from the source
    pub frames_read: AtomicU64,

    /// Frames accepted by the queue
    pub frames_enqueued: AtomicU64,

    /// Frames handed to the consumer
    pub frames_dequeued: AtomicU64,

    /// Source lines that failed to decode
    pub parse_errors: AtomicU64,

    /// Sends that hit the hard timeout
    pub overflows: AtomicU64,

    /// Current queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self, queue_len: usize) {
        self.frames_enqueued.fetch_add(1, Ordering::Relaxed);
        self.update_queue_len(queue_len);
    }

    pub fn record_dequeued(&self, queue_len: usize) {
        self.frames_dequeued.fetch_add(1, Ordering::Relaxed);
        self.update_queue_len(queue_len);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        observability::record_queue_depth(len);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            frames_dequeued: self.frames_dequeued.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_read: u64,
    pub frames_enqueued: u64,
    pub frames_dequeued: u64,
    pub parse_errors: u64,
    pub overflows: u64,
    pub queue_len: usize,
}

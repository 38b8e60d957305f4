//! Bounded detection queue
//!
//! The producer blocks while the queue is full. If it is still full after the
//! hard timeout the send fails with [`IngestionError::QueueOverflow`]; frames
//! are never dropped silently.
//!
//! A blocked producer parks on a condvar that the consumer signals after every
//! dequeue and on close, so it wakes once per freed slot instead of polling.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{FrameDetections, QueueConfig};
use tracing::{error, trace};

use crate::metrics::IngestionMetrics;
use crate::{IngestionError, Result};

/// Upper bound on one park; a consumer dropped without closing is noticed this late
const MAX_PARK: Duration = Duration::from_millis(50);

/// Dequeue counter the producer waits on while the queue is full
#[derive(Debug, Default)]
struct SpaceSignal {
    generation: Mutex<u64>,
    freed: Condvar,
}

impl SpaceSignal {
    fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.freed.notify_all();
    }

    /// Park until the generation moves past `seen` or `timeout` elapses
    fn wait_past(&self, seen: u64, timeout: Duration) {
        let guard = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .freed
            .wait_timeout_while(guard, timeout, |generation| *generation == seen)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Create a bounded detection queue
pub fn detection_queue(
    config: &QueueConfig,
    metrics: Arc<IngestionMetrics>,
) -> (DetectionSender, DetectionReceiver) {
    let (tx, rx) = bounded(config.capacity.max(1));
    let space = Arc::new(SpaceSignal::default());
    (
        DetectionSender {
            tx,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            metrics: Arc::clone(&metrics),
            space: Arc::clone(&space),
        },
        DetectionReceiver { rx, metrics, space },
    )
}

/// Producer side
#[derive(Clone)]
pub struct DetectionSender {
    tx: Sender<FrameDetections>,
    send_timeout: Duration,
    metrics: Arc<IngestionMetrics>,
    space: Arc<SpaceSignal>,
}

impl DetectionSender {
    /// Enqueue a frame, blocking while the queue is full
    ///
    /// # Errors
    /// `QueueOverflow` once the hard timeout passes, `QueueClosed` if the
    /// queue was closed.
    pub fn send(&self, frame: FrameDetections) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.send_timeout;
        let mut pending = frame;

        loop {
            // read before trying so a dequeue in between is never missed
            let seen = self.space.generation();
            match self.tx.try_send(pending) {
                Ok(()) => {
                    self.metrics.record_enqueued(self.tx.len());
                    trace!(queue_len = self.tx.len(), "frame enqueued");
                    return Ok(());
                }
                Err(TrySendError::Full(frame)) => {
                    if Instant::now() >= deadline {
                        self.metrics.record_overflow();
                        let waited_ms = started.elapsed().as_millis() as u64;
                        error!(
                            frame_index = frame.frame_index,
                            waited_ms,
                            capacity = self.capacity(),
                            "Detection queue overflow"
                        );
                        return Err(IngestionError::QueueOverflow {
                            frame_index: frame.frame_index,
                            waited_ms,
                        });
                    }
                    pending = frame;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    self.space.wait_past(seen, remaining.min(MAX_PARK));
                }
                Err(TrySendError::Closed(_)) => return Err(IngestionError::QueueClosed),
            }
        }
    }

    /// Stop accepting frames; frames already queued can still be received
    pub fn close(&self) -> bool {
        let closed = self.tx.close();
        self.space.notify();
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }
}

/// Consumer side
#[derive(Clone)]
pub struct DetectionReceiver {
    rx: Receiver<FrameDetections>,
    metrics: Arc<IngestionMetrics>,
    space: Arc<SpaceSignal>,
}

impl DetectionReceiver {
    /// Next frame, blocking; None once the queue is closed and drained
    pub fn recv_blocking(&self) -> Option<FrameDetections> {
        let frame = self.rx.recv_blocking().ok()?;
        self.dequeued();
        Some(frame)
    }

    /// Next frame without waiting
    pub fn try_recv(&self) -> Option<FrameDetections> {
        let frame = self.rx.try_recv().ok()?;
        self.dequeued();
        Some(frame)
    }

    fn dequeued(&self) {
        self.metrics.record_dequeued(self.rx.len());
        self.space.notify();
    }

    /// Close from the consumer side (producers see `QueueClosed`)
    pub fn close(&self) -> bool {
        let closed = self.rx.close();
        self.space.notify();
        closed
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }
}

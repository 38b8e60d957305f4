//! Producer thread: pulls a source and feeds the detection queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::queue::DetectionSender;
use crate::source::DetectionSource;
use crate::{IngestionError, Result};

/// How the producer finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub frames_sent: u64,
    pub parse_errors: u64,
    /// Stopped by request or because the queue was closed
    pub interrupted: bool,
}

/// Running producer thread
pub struct ProducerHandle {
    stop: Arc<AtomicBool>,
    sender: DetectionSender,
    thread: JoinHandle<Result<ProducerReport>>,
}

impl ProducerHandle {
    /// Stop reading and close the queue; frames already queued stay receivable
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.sender.close();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread (blocking)
    pub fn join(self) -> Result<ProducerReport> {
        self.thread
            .join()
            .map_err(|_| IngestionError::ProducerPanicked)?
    }
}

/// Spawn the producer on its own OS thread
///
/// The queue is closed when the source ends, so the consumer sees end of
/// stream once it has drained everything.
pub fn spawn_producer(
    mut source: Box<dyn DetectionSource>,
    sender: DetectionSender,
    max_frames: Option<u64>,
) -> Result<ProducerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let thread_sender = sender.clone();

    let thread = std::thread::Builder::new()
        .name("detection-producer".to_string())
        .spawn(move || {
            let result = produce(source.as_mut(), &thread_sender, &thread_stop, max_frames);
            thread_sender.close();
            result
        })?;

    Ok(ProducerHandle {
        stop,
        sender,
        thread,
    })
}

fn produce(
    source: &mut dyn DetectionSource,
    sender: &DetectionSender,
    stop: &AtomicBool,
    max_frames: Option<u64>,
) -> Result<ProducerReport> {
    let mut report = ProducerReport::default();
    let metrics = Arc::clone(sender.metrics());
    info!(source = %source.name(), ?max_frames, "Producer started");

    loop {
        if stop.load(Ordering::SeqCst) {
            report.interrupted = true;
            break;
        }
        if max_frames.is_some_and(|max| report.frames_sent >= max) {
            debug!(frames = report.frames_sent, "Frame limit reached");
            break;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if !e.is_fatal() => {
                metrics.record_parse_error();
                report.parse_errors += 1;
                warn!(source = %source.name(), error = %e, "Skipping unreadable frame");
                continue;
            }
            Err(e) => return Err(e),
        };
        metrics.record_read();

        match sender.send(frame) {
            Ok(()) => report.frames_sent += 1,
            Err(IngestionError::QueueClosed) => {
                report.interrupted = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        source = %source.name(),
        frames = report.frames_sent,
        parse_errors = report.parse_errors,
        interrupted = report.interrupted,
        "Producer finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::IngestionMetrics;
    use crate::queue::detection_queue;
    use crate::source::{JsonlSource, MockSource};
    use contracts::{FrameDetections, QueueConfig};
    use std::io::Cursor;
    use std::time::Duration;

    fn queue(capacity: usize, timeout_ms: u64) -> (DetectionSender, crate::DetectionReceiver) {
        detection_queue(
            &QueueConfig {
                capacity,
                send_timeout_ms: timeout_ms,
            },
            Arc::new(IngestionMetrics::new()),
        )
    }

    fn frames(n: u64) -> Vec<FrameDetections> {
        (0..n).map(|i| FrameDetections::new(i, i as f64, Vec::new())).collect()
    }

    #[test]
    fn test_producer_delivers_everything_in_order() {
        let (tx, rx) = queue(2, 1_000);
        let handle = spawn_producer(Box::new(MockSource::new("mock", frames(10))), tx, None).unwrap();

        let mut seen = Vec::new();
        while let Some(frame) = rx.recv_blocking() {
            seen.push(frame.frame_index);
        }
        let report = handle.join().unwrap();

        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(report.frames_sent, 10);
        assert!(!report.interrupted);
    }

    #[test]
    fn test_max_frames() {
        let (tx, rx) = queue(16, 1_000);
        let handle = spawn_producer(Box::new(MockSource::new("mock", frames(10))), tx, Some(4)).unwrap();
        let report = handle.join().unwrap();
        assert_eq!(report.frames_sent, 4);
        assert_eq!(std::iter::from_fn(|| rx.recv_blocking()).count(), 4);
    }

    #[test]
    fn test_parse_errors_are_counted_not_fatal() {
        let input = "garbage\n{\"frame_index\": 0, \"timestamp\": 0.0}\n{bad\n{\"frame_index\": 1, \"timestamp\": 0.1}\n";
        let (tx, rx) = queue(16, 1_000);
        let handle = spawn_producer(
            Box::new(JsonlSource::from_reader("inline", Cursor::new(input))),
            tx,
            None,
        )
        .unwrap();

        let report = handle.join().unwrap();
        assert_eq!(report.frames_sent, 2);
        assert_eq!(report.parse_errors, 2);
        assert_eq!(rx.metrics().snapshot().parse_errors, 2);
    }

    #[test]
    fn test_overflow_is_surfaced() {
        let (tx, _rx) = queue(1, 10);
        let handle = spawn_producer(Box::new(MockSource::new("mock", frames(5))), tx, None).unwrap();
        assert!(matches!(
            handle.join(),
            Err(IngestionError::QueueOverflow { frame_index: 1, .. })
        ));
    }

    #[test]
    fn test_stop_leaves_queued_frames_receivable() {
        let (tx, rx) = queue(4, 1_000);
        let source = MockSource::new("live", frames(1_000)).with_interval(Duration::from_millis(2));
        let handle = spawn_producer(Box::new(source), tx, None).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        handle.stop();
        let report = handle.join().unwrap();
        assert!(report.interrupted);

        let drained = std::iter::from_fn(|| rx.recv_blocking()).count() as u64;
        assert!(drained <= report.frames_sent);
        assert!(drained > 0);
    }
}

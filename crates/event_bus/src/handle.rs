//! SinkHandle - runs a sink behind its own bounded queue and worker task

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{ContractError, EventSink, SafetyEvent, DEFAULT_ENQUEUE_TIMEOUT_MS};

use crate::metrics::SinkMetrics;
use crate::EventSubscriber;

/// How long a publish may wait on a full sink queue before the event is dropped
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(DEFAULT_ENQUEUE_TIMEOUT_MS);

const ENQUEUE_POLL: Duration = Duration::from_millis(1);

/// Handle to a running sink worker
///
/// Registered with the bus as an ordinary subscriber; delivery is an enqueue,
/// the actual write happens on the worker task.
pub struct SinkHandle {
    name: String,
    /// Channel to the worker; taken on shutdown
    tx: Mutex<Option<mpsc::Sender<SafetyEvent>>>,
    metrics: Arc<SinkMetrics>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    enqueue_timeout: Duration,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: EventSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        Self::spawn_with_timeout(sink, queue_capacity, DEFAULT_ENQUEUE_TIMEOUT)
    }

    pub fn spawn_with_timeout<S: EventSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        enqueue_timeout: Duration,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx: Mutex::new(Some(tx)),
            metrics,
            worker_handle: Mutex::new(Some(worker_handle)),
            enqueue_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    pub fn enqueue_timeout(&self) -> Duration {
        self.enqueue_timeout
    }

    /// Enqueue an event, waiting up to the enqueue timeout while the queue is full
    ///
    /// Returns true if queued, false if dropped (deadline passed or worker gone).
    pub fn try_send(&self, event: SafetyEvent) -> bool {
        let tx = match self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(tx) => tx.clone(),
            None => {
                warn!(sink = %self.name, event_id = %event.event_id, "Sink already shut down, event dropped");
                self.metrics.inc_dropped_count();
                return false;
            }
        };

        let deadline = Instant::now() + self.enqueue_timeout;
        let mut pending = event;
        loop {
            match tx.try_send(pending) {
                Ok(()) => {
                    self.metrics
                        .set_queue_len(tx.max_capacity() - tx.capacity());
                    return true;
                }
                Err(mpsc::error::TrySendError::Full(e)) => {
                    if Instant::now() >= deadline {
                        self.metrics.inc_dropped_count();
                        observability::record_sink_dropped(&self.name);
                        warn!(
                            sink = %self.name,
                            event_id = %e.event_id,
                            timeout_ms = self.enqueue_timeout.as_millis() as u64,
                            "Queue full past deadline, event dropped"
                        );
                        return false;
                    }
                    pending = e;
                    std::thread::sleep(ENQUEUE_POLL);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    error!(sink = %self.name, "Sink worker closed unexpectedly");
                    self.metrics.inc_dropped_count();
                    return false;
                }
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Everything already queued is written, then the sink is flushed and closed.
    /// Idempotent.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(&self) {
        // Drop sender to signal worker to stop
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());

        let worker = self
            .worker_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
            }
            debug!(sink = %self.name, "SinkHandle shutdown complete");
        }
    }
}

impl EventSubscriber for SinkHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &SafetyEvent) -> Result<(), ContractError> {
        if self.try_send(event.clone()) {
            Ok(())
        } else {
            Err(ContractError::sink_write(&self.name, "event not queued"))
        }
    }
}

/// Worker task that consumes events and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: EventSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SafetyEvent>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&event).await {
            Ok(()) => {
                metrics.inc_write_count();
                observability::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_sink_write(&name, false);
                error!(
                    sink = %name,
                    event_id = %event.event_id,
                    error = %e,
                    "Write failed"
                );
                // Keep consuming; one bad write must not stall the queue
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

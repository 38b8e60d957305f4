//! EventBus - in-process publish/subscribe hub
//!
//! The registry is a copy-on-write snapshot: each publish clones the current
//! `Arc<Vec<..>>` once and delivers against it, so subscribe/unsubscribe never
//! change membership under an in-flight publish. Publishes themselves are
//! serialized by a dedicated lock; a subscriber never sees two events
//! interleaved.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use contracts::{BusConfig, SafetyEvent};
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::{BusMetrics, BusMetricsSnapshot, MetricsSnapshot};
use crate::sinks::DashboardFeed;
use crate::{BusError, EventSubscriber, SinkHandle};

/// Subscription identifier
pub type SubscriptionId = u64;

/// Token returned by `subscribe`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
}

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    subscriber: Arc<dyn EventSubscriber>,
}

/// Outcome of one publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
    pub slow: usize,
}

/// Publish/subscribe hub
pub struct EventBus {
    registry: Mutex<Arc<Vec<Registration>>>,
    publish_lock: Mutex<()>,
    next_id: AtomicU64,
    closed: AtomicBool,
    slow_threshold: Duration,
    /// Queue-backed sinks to drain on close
    queued: Mutex<Vec<Arc<SinkHandle>>>,
    dashboards: Mutex<Vec<Arc<DashboardFeed>>>,
    metrics: BusMetrics,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .field("slow_threshold", &self.slow_threshold)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(&BusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            registry: Mutex::new(Arc::new(Vec::new())),
            publish_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            slow_threshold: Duration::from_millis(config.slow_subscriber_ms),
            queued: Mutex::new(Vec::new()),
            dashboards: Mutex::new(Vec::new()),
            metrics: BusMetrics::default(),
        }
    }

    /// Register a handler; it receives every event published after this call
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = subscriber.name().to_string();

        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(registry.len() + 1);
        next.extend(registry.iter().cloned());
        next.push(Registration { id, subscriber });
        *registry = Arc::new(next);

        debug!(subscription = id, subscriber = %name, "Subscribed");
        Subscription { id, name }
    }

    /// Register a queue-backed sink; it is drained and closed by `close`
    pub fn subscribe_queued(&self, handle: SinkHandle) -> Subscription {
        let handle = Arc::new(handle);
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&handle));
        self.subscribe(handle)
    }

    /// Register a dashboard feed; it stays readable through `dashboard`
    pub fn subscribe_dashboard(&self, feed: Arc<DashboardFeed>) -> Subscription {
        self.dashboards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&feed));
        self.subscribe(feed)
    }

    /// Remove a handler; publishes already in flight still deliver to it
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<(), BusError> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if !registry.iter().any(|r| r.id == subscription.id) {
            return Err(BusError::UnknownSubscription(subscription.id));
        }
        let next: Vec<Registration> = registry
            .iter()
            .filter(|r| r.id != subscription.id)
            .cloned()
            .collect();
        *registry = Arc::new(next);

        debug!(subscription = subscription.id, subscriber = %subscription.name, "Unsubscribed");
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Deliver one event to every current subscriber
    ///
    /// Errors and panics inside handlers are caught, logged and counted; they
    /// never reach the caller.
    ///
    /// # Errors
    /// Only `BusError::Closed`.
    #[instrument(
        name = "bus_publish",
        skip(self, event),
        fields(event_type = %event.event_type, frame_index = event.frame_index)
    )]
    pub fn publish(&self, event: &SafetyEvent) -> Result<PublishReport, BusError> {
        let _serial = self
            .publish_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let snapshot = Arc::clone(&self.registry.lock().unwrap_or_else(PoisonError::into_inner));
        self.metrics.inc_published();

        let mut report = PublishReport::default();
        for registration in snapshot.iter() {
            let subscriber = &registration.subscriber;
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event)));
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    self.metrics.inc_delivered();
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    self.metrics.inc_failed();
                    observability::record_subscriber_failure(subscriber.name(), "error");
                    warn!(
                        subscriber = %subscriber.name(),
                        event_id = %event.event_id,
                        error = %e,
                        "Subscriber failed, delivery continues"
                    );
                }
                Err(payload) => {
                    report.failed += 1;
                    self.metrics.inc_panicked();
                    observability::record_subscriber_failure(subscriber.name(), "panic");
                    error!(
                        subscriber = %subscriber.name(),
                        event_id = %event.event_id,
                        panic = %panic_message(payload.as_ref()),
                        "Subscriber panicked, delivery continues"
                    );
                }
            }

            if elapsed > self.slow_threshold {
                report.slow += 1;
                self.metrics.inc_slow();
                let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                observability::record_slow_subscriber(subscriber.name(), elapsed_ms);
                warn!(
                    subscriber = %subscriber.name(),
                    elapsed_ms,
                    threshold_ms = self.slow_threshold.as_millis() as u64,
                    "Slow subscriber"
                );
            }
        }

        Ok(report)
    }

    /// Stop accepting publishes, then drain and close every queued sink
    ///
    /// Waits for an in-flight publish to finish first. Idempotent.
    #[instrument(name = "bus_close", skip(self))]
    pub async fn close(&self) {
        {
            let _serial = self
                .publish_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        let handles: Vec<Arc<SinkHandle>> = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for handle in &handles {
            handle.shutdown().await;
        }

        let stats = self.metrics.snapshot();
        info!(
            published = stats.published,
            delivered = stats.delivered,
            failed = stats.failed + stats.panicked,
            queued_sinks = handles.len(),
            "Event bus closed"
        );
    }

    pub fn metrics(&self) -> BusMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Metrics for every queued sink
    pub fn sink_metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Dashboard feed by sink name
    pub fn dashboard(&self, name: &str) -> Option<Arc<DashboardFeed>> {
        self.dashboards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.name() == name)
            .cloned()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

//! # Event Bus
//!
//! In-process publish/subscribe hub between the rule engine and the sinks.
//!
//! Responsibilities:
//! - Serialized, ordered fan-out of `SafetyEvent`s to every subscriber
//! - Isolate subscriber errors and panics; flag slow subscribers
//! - Run I/O-bound sinks behind their own bounded queue and worker
//! - Drain queued sinks on close so a clean shutdown loses nothing

pub mod builder;
pub mod bus;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;
pub mod subscriber;

pub use builder::{create_event_bus, EventBusBuilder};
pub use bus::{EventBus, PublishReport, Subscription, SubscriptionId};
pub use contracts::{EventSink, SafetyEvent};
pub use error::BusError;
pub use handle::{SinkHandle, DEFAULT_ENQUEUE_TIMEOUT};
pub use metrics::{BusMetricsSnapshot, MetricsSnapshot, SinkMetrics};
pub use sinks::{
    decode_datagram, DashboardFeed, DashboardSnapshot, FileSink, LogSink, NetworkFormat,
    NetworkSink, WireEvent,
};
pub use subscriber::{EventSubscriber, FnSubscriber};

//! EventBusBuilder - wires configured sinks into a bus

use std::sync::Arc;

use tracing::{info, instrument};

use contracts::{BusConfig, EventSink, SinkConfig, SinkType};

use crate::error::BusError;
use crate::handle::SinkHandle;
use crate::sinks::{DashboardFeed, FileSink, LogSink, NetworkSink};
use crate::EventBus;

/// Builder for creating an EventBus with its sinks attached
pub struct EventBusBuilder {
    config: BusConfig,
    sinks: Vec<SinkConfig>,
}

impl EventBusBuilder {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
        }
    }

    pub fn with_sinks(mut self, sinks: impl IntoIterator<Item = SinkConfig>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Build the bus and attach every enabled sink
    ///
    /// Must be called from within a tokio runtime (queued sinks spawn workers).
    #[instrument(name = "event_bus_build", skip(self), fields(sink_count = self.sinks.len()))]
    pub async fn build(self) -> Result<EventBus, BusError> {
        let bus = EventBus::new(&self.config);
        for sink_config in self.sinks.iter().filter(|s| s.enabled) {
            attach_sink(&bus, sink_config).await?;
        }
        info!(subscribers = bus.subscriber_count(), "Event bus ready");
        Ok(bus)
    }
}

/// Create a sink from configuration and subscribe it
#[instrument(
    name = "event_bus_attach_sink",
    skip(bus, config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
async fn attach_sink(bus: &EventBus, config: &SinkConfig) -> Result<(), BusError> {
    match config.sink_type {
        SinkType::Log => {
            bus.subscribe(Arc::new(LogSink::new(&config.name)));
        }
        SinkType::Dashboard => {
            let feed = DashboardFeed::from_params(&config.name, &config.params);
            bus.subscribe_dashboard(Arc::new(feed));
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| BusError::sink_creation(&config.name, e.to_string()))?;
            bus.subscribe_queued(spawn_queued(sink, config));
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| BusError::sink_creation(&config.name, e.to_string()))?;
            bus.subscribe_queued(spawn_queued(sink, config));
        }
    }
    Ok(())
}

/// Start the worker for a queue-backed sink with its configured capacity and deadline
fn spawn_queued<S: EventSink + Send + 'static>(sink: S, config: &SinkConfig) -> SinkHandle {
    SinkHandle::spawn_with_timeout(sink, config.queue_capacity, config.enqueue_timeout())
}

/// Convenience function to create a bus from config
pub async fn create_event_bus(
    config: BusConfig,
    sinks: Vec<SinkConfig>,
) -> Result<EventBus, BusError> {
    EventBusBuilder::new(config).with_sinks(sinks).build().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, DedupKey, EventPayload, EventType, SafetyEvent, Severity};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    /// Sink that takes a long time per write
    struct SlowSink;

    impl EventSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        async fn write(&mut self, _event: &SafetyEvent) -> Result<(), ContractError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn event(track: u64) -> SafetyEvent {
        SafetyEvent::new(
            DedupKey::track(track, EventType::LaneViolation),
            "CAM_01",
            track,
            0.1,
            Severity::High,
            EventPayload::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_configured_enqueue_timeout_bounds_publish() {
        let mut config = SinkConfig::new("slow", SinkType::File);
        config.queue_capacity = 1;
        config.enqueue_timeout_ms = 5;

        let handle = spawn_queued(SlowSink, &config);
        assert_eq!(handle.enqueue_timeout(), Duration::from_millis(5));

        // the worker holds one event and the queue one more; later sends hit the deadline
        for track in 0..3 {
            handle.try_send(event(track));
        }
        let started = Instant::now();
        assert!(!handle.try_send(event(9)));
        assert!(started.elapsed() < Duration::from_millis(45));
        assert!(handle.metrics().dropped_count() >= 1);

        handle.shutdown().await;
    }

    #[test]
    fn test_enqueue_timeout_defaults_from_config() {
        let config = SinkConfig::new("event_log", SinkType::File);
        assert_eq!(config.enqueue_timeout(), crate::DEFAULT_ENQUEUE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_build_from_config_skips_disabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut disabled = SinkConfig::new("off", SinkType::Log);
        disabled.enabled = false;
        let sinks = vec![
            SinkConfig::new("console", SinkType::Log),
            SinkConfig::new("event_log", SinkType::File)
                .with_param("path", path.display().to_string()),
            SinkConfig::new("dashboard", SinkType::Dashboard),
            disabled,
        ];

        let bus = create_event_bus(BusConfig::default(), sinks).await.unwrap();
        assert_eq!(bus.subscriber_count(), 3);

        let event = SafetyEvent::new(
            DedupKey::track(1, EventType::EmergencyVehicle),
            "CAM_01",
            5,
            0.2,
            Severity::High,
            EventPayload::default(),
        );
        let report = bus.publish(&event).unwrap();
        assert_eq!(report.delivered, 3);

        bus.close().await;
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
        assert_eq!(bus.dashboard("dashboard").unwrap().snapshot().total, 1);
        let metrics = bus.sink_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].1.write_count, 1);
    }

    #[tokio::test]
    async fn test_bad_network_params_fail_build() {
        let sinks = vec![SinkConfig::new("remote", SinkType::Network)];
        let err = create_event_bus(BusConfig::default(), sinks).await.unwrap_err();
        assert!(matches!(err, BusError::SinkCreation { .. }));
    }
}

//! LogSink - console notifier via tracing

use contracts::{ContractError, EventSink, SafetyEvent, Severity};
use tracing::{info, instrument, warn};

use crate::EventSubscriber;

/// Sink that announces events on the log
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn announce(&self, event: &SafetyEvent) {
        let track_id = event.track_id.map(|id| id as i64).unwrap_or(-1);
        match event.severity {
            Severity::High => warn!(
                sink = %self.name,
                event_type = %event.event_type,
                track_id,
                camera = %event.camera_id,
                frame_index = event.frame_index,
                severity = %event.severity,
                class = %event.payload.class_label,
                "Safety event"
            ),
            Severity::Low | Severity::Medium => info!(
                sink = %self.name,
                event_type = %event.event_type,
                track_id,
                camera = %event.camera_id,
                frame_index = event.frame_index,
                severity = %event.severity,
                class = %event.payload.class_label,
                "Safety event"
            ),
        }
    }
}

impl EventSubscriber for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &SafetyEvent) -> Result<(), ContractError> {
        self.announce(event);
        Ok(())
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, frame_index = event.frame_index)
    )]
    async fn write(&mut self, event: &SafetyEvent) -> Result<(), ContractError> {
        self.announce(event);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

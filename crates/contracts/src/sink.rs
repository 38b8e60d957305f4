//! EventSink trait - Event Bus output interface
//!
//! Defines the abstract interface for sinks and their routing config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::{ContractError, SafetyEvent};

/// Default JSONL event log location
pub const DEFAULT_EVENT_LOG_PATH: &str = "data/logs/events.jsonl";

/// How long a publish may wait on a full sink queue before dropping the event
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 50;

/// Event output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, event: &SafetyEvent) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name (unique within a config)
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Disabled sinks are skipped unless enabled from the command line
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Queue capacity (queue-backed sinks only)
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Longest a publish waits on this sink's full queue (queue-backed sinks only)
    #[serde(default = "default_enqueue_timeout_ms")]
    #[validate(range(min = 1, max = 10_000))]
    pub enqueue_timeout_ms: u64,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    100
}

fn default_enqueue_timeout_ms() -> u64 {
    DEFAULT_ENQUEUE_TIMEOUT_MS
}

impl SinkConfig {
    pub fn new(name: impl Into<String>, sink_type: SinkType) -> Self {
        Self {
            name: name.into(),
            sink_type,
            enabled: true,
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            params: HashMap::new(),
        }
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Console notifier (tracing)
    Log,
    /// JSONL event log
    File,
    /// Remote-sync forwarder (UDP)
    Network,
    /// In-memory dashboard reader
    Dashboard,
}

impl SinkType {
    /// Whether the sink does I/O and therefore gets its own queue and worker
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::File | Self::Network)
    }
}

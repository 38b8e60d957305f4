//! Layered error definitions
//!
//! Categorized by source: config / ingestion / bus / sink / invariant

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Ingestion Errors =====
    /// Detection queue stayed full past the hard timeout
    #[error("detection queue overflow: frame {frame_index} not accepted within {waited_ms}ms")]
    QueueOverflow { frame_index: u64, waited_ms: u64 },

    // ===== Bus Errors =====
    /// Publish or subscribe after the bus was closed
    #[error("event bus is closed")]
    BusClosed,

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== Invariant Errors =====
    /// Internal invariant violated; the pipeline instance must halt
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create invariant violation error
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Whether this error must stop the pipeline
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::QueueOverflow { .. }
        )
    }
}

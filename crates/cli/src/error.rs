//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// `--enable-sink` / `--disable-sink` named a sink the config does not define
    #[error("Unknown sink '{name}' (configured: {known})")]
    UnknownSink { name: String, known: String },

    /// The pipeline stopped on a fatal error
    #[error("Pipeline stopped: {message}")]
    PipelineFatal { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn unknown_sink(name: impl Into<String>, known: &[&str]) -> Self {
        Self::UnknownSink {
            name: name.into(),
            known: known.join(", "),
        }
    }

    pub fn pipeline_fatal(message: impl Into<String>) -> Self {
        Self::PipelineFatal {
            message: message.into(),
        }
    }
}

//! FileSink - appends events to a JSONL log, one self-describing record per line

use contracts::{ContractError, EventSink, SafetyEvent, DEFAULT_EVENT_LOG_PATH};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// JSONL file the events are appended to
    pub path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENT_LOG_PATH));

        Self { path }
    }
}

/// Sink that appends events to disk
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    /// Open (or create) the log file for appending
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    pub fn path(&self) -> &PathBuf {
        &self.config.path
    }

    fn append_line(&mut self, event: &SafetyEvent) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("file sink closed"))?;
        serde_json::to_writer(&mut *writer, event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
        // Whole lines only, so tailing consumers never see a partial record
        writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    fn persist_event(&mut self, event: &SafetyEvent) -> Result<(), ContractError> {
        self.append_line(event).map_err(|e| {
            error!(sink = %self.name, event_id = %event.event_id, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, frame_index = event.frame_index)
    )]
    async fn write(&mut self, event: &SafetyEvent) -> Result<(), ContractError> {
        self.persist_event(event)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(sink = %self.name, lines = self.lines, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}

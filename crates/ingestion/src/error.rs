//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    /// Queue stayed full past the hard send timeout
    #[error("detection queue full for {waited_ms}ms, frame {frame_index} not accepted")]
    QueueOverflow { frame_index: u64, waited_ms: u64 },

    /// Consumer side gone (shutdown or crash)
    #[error("detection queue closed")]
    QueueClosed,

    /// A source line could not be decoded
    #[error("{source_name}:{line}: {message}")]
    Parse {
        source_name: String,
        line: u64,
        message: String,
    },

    #[error("source io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("producer thread panicked")]
    ProducerPanicked,
}

/// Ingestion Result alias
pub type Result<T> = std::result::Result<T, IngestionError>;

impl IngestionError {
    /// Whether the pipeline must stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::QueueOverflow { .. } | Self::Io(_) | Self::ProducerPanicked
        )
    }
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::QueueOverflow {
                frame_index,
                waited_ms,
            } => ContractError::QueueOverflow {
                frame_index,
                waited_ms,
            },
            IngestionError::Io(e) => ContractError::Io(e),
            other => ContractError::Other(other.to_string()),
        }
    }
}

use crate::types::StreamStatus;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Stream unavailable for {}: {source}", .path.display())]
    StreamUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write failure on {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No open stream (status {0:?})")]
    InvalidStreamState(StreamStatus),

    #[error("Columnar conversion failed: {0}")]
    ConversionFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Writer is closed")]
    WriterClosed,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AuditError {
    /// Build a `StreamUnavailable` error for `path`.
    pub fn stream_unavailable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AuditError::StreamUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Build a `WriteFailure` error for `path`.
    pub fn write_failure(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AuditError::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Whether the writer recovers from this error by reusing the last log file.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuditError::StreamUnavailable { .. } | AuditError::WriteFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

// Backend implementations outside this workspace can surface their own error
// types through `AuditError::Other`, or convert to `io::Error` so the writer
// classifies them as `StreamUnavailable` / `WriteFailure`.

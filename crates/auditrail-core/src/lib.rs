//! Auditrail Core: traits and types for the auditrail audit log writer
//!
//! This crate defines the abstractions shared by the writer and its backends:
//! - Storage backend: create/append/capability/exists/delete on log files
//! - Columnar converter: turns closed JSON-lines logs into columnar files
//! - Path templates: time-bucketed file naming
//! - Stream state: the open/closed/error lifecycle of the output stream
//! - Configuration: destination, rollover and storage settings

pub mod config;
pub mod converter;
pub mod error;
pub mod observe;
pub mod storage;
pub mod types;

pub use config::{DestinationConfig, RolloverConfig, RolloverPolicy, StorageConfig, WriterConfig};
pub use converter::{columnar_path_for, ColumnarConverter};
pub use error::{AuditError, Result};
pub use storage::{AuditStream, PathCapability, StorageBackend};
pub use types::{
    AuditPath, AuditPathTemplate, PathTemplate, StreamState, StreamStatus, TemplateContext,
};

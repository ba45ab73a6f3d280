use crate::types::AuditPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamStatus {
    /// No stream is open
    Closed,
    /// A stream is open and healthy
    Open,
    /// The last open or write failed; the next attempt reuses the same path
    /// when one was opened
    Error,
}

/// In-memory record of the writer's output stream
///
/// Invariant: `reuse_last_log_file` implies the status is `Closed` or `Error`
/// and `path` holds the location the next open must use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    status: StreamStatus,
    path: Option<AuditPath>,
    opened_at: Option<DateTime<Utc>>,
    last_error: bool,
    reuse_last_log_file: bool,
    lines_written: u64,
    bytes_written: u64,
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            status: StreamStatus::Closed,
            path: None,
            opened_at: None,
            last_error: false,
            reuse_last_log_file: false,
            lines_written: 0,
            bytes_written: 0,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == StreamStatus::Open
    }

    /// Path of the open file, or of the last failed attempt when reusing
    pub fn path(&self) -> Option<&AuditPath> {
        self.path.as_ref()
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn last_error(&self) -> bool {
        self.last_error
    }

    pub fn reuse_last_log_file(&self) -> bool {
        self.reuse_last_log_file
    }

    /// Lines written since the stream was opened
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Bytes written since the stream was opened
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path the next open must reuse, if any
    pub fn reuse_path(&self) -> Option<&AuditPath> {
        if self.reuse_last_log_file {
            self.path.as_ref()
        } else {
            None
        }
    }

    /// A stream was opened on `path`
    pub fn mark_open(&mut self, path: AuditPath, now: DateTime<Utc>) {
        self.status = StreamStatus::Open;
        self.path = Some(path);
        self.opened_at = Some(now);
        self.last_error = false;
        self.reuse_last_log_file = false;
        self.lines_written = 0;
        self.bytes_written = 0;
    }

    /// An open or write on `path` failed; the next attempt reuses it
    pub fn mark_error(&mut self, path: AuditPath) {
        self.status = StreamStatus::Error;
        self.path = Some(path);
        self.opened_at = None;
        self.last_error = true;
        self.reuse_last_log_file = true;
    }

    /// No fresh path could be minted; nothing to reuse, the next open mints again
    pub fn mark_failed(&mut self) {
        self.status = StreamStatus::Error;
        self.path = None;
        self.opened_at = None;
        self.last_error = true;
        self.reuse_last_log_file = false;
        self.lines_written = 0;
        self.bytes_written = 0;
    }

    /// The stream was closed; the next open mints a fresh path
    pub fn mark_closed(&mut self) {
        self.status = StreamStatus::Closed;
        self.path = None;
        self.opened_at = None;
        self.last_error = false;
        self.reuse_last_log_file = false;
        self.lines_written = 0;
        self.bytes_written = 0;
    }

    pub fn record_write(&mut self, lines: u64, bytes: u64) {
        self.lines_written += lines;
        self.bytes_written += bytes;
    }
}

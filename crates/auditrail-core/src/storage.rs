//! Storage backend trait and stream handle
//!
//! Defines the interface the writer uses to reach local disk, distributed
//! filesystems, or in-memory fakes. Backends differ in what they support
//! (append in particular), so capabilities are queried per path.

use crate::error::Result;
use std::io::{self, Write};
use std::path::Path;

/// Capabilities a backend may report for a given path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PathCapability {
    /// Opening an existing file for appended writes is supported
    Append,
}

/// An open output stream on a storage backend
///
/// Writes go through [`std::io::Write`]. Some backends only surface failures
/// lazily (e.g. a broken replication pipeline); `check_health` reports such
/// sticky errors after a write + flush.
pub trait AuditStream: Write + Send {
    /// Report any deferred error recorded by the stream
    fn check_health(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Flush and finalize the stream
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Storage backend for audit log files
///
/// Implement this trait to add support for other storage systems
/// (HDFS, object stores, etc.)
pub trait StorageBackend: Send + Sync {
    /// Backend identifier (`file`, `memory`, ...)
    fn scheme(&self) -> &str;

    /// Create (or truncate) a file, creating parent directories as needed
    fn create(&self, path: &Path) -> Result<Box<dyn AuditStream>>;

    /// Open an existing file for appending
    fn append(&self, path: &Path) -> Result<Box<dyn AuditStream>>;

    /// Whether the backend supports `capability` for `path`
    fn has_capability(&self, path: &Path, capability: PathCapability) -> bool;

    /// Whether `path` exists
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Delete `path`
    fn delete(&self, path: &Path) -> Result<()>;

    /// Create a directory and its parents (optional)
    fn create_dirs(&self, path: &Path) -> Result<()> {
        let _ = path;
        Ok(())
    }
}

//! In-memory storage backend
//!
//! Keeps files in a shared map and records every backend call, so tests can
//! assert which operations the writer attempted. Failures can be injected for
//! creates, appends, writes and stream health checks.

use auditrail_core::{AuditError, AuditStream, PathCapability, Result, StorageBackend};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A call made against a [`MemoryStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create(PathBuf),
    Append(PathBuf),
    HasCapability(PathBuf, PathCapability),
    Exists(PathBuf),
    Delete(PathBuf),
    CreateDirs(PathBuf),
}

#[derive(Debug)]
struct MemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    calls: Vec<BackendCall>,
    append_supported: bool,
    failing_creates: u32,
    failing_appends: u32,
    fail_writes: bool,
    fail_health: bool,
}

/// In-memory storage backend
///
/// Cloning shares the underlying files.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                files: HashMap::new(),
                calls: Vec::new(),
                append_supported: true,
                failing_creates: 0,
                failing_appends: 0,
                fail_writes: false,
                fail_health: false,
            })),
        }
    }

    /// Set whether the backend reports the append capability
    pub fn set_append_supported(&self, supported: bool) {
        self.state.lock().append_supported = supported;
    }

    /// Fail the next `n` creates
    pub fn fail_next_creates(&self, n: u32) {
        self.state.lock().failing_creates = n;
    }

    /// Fail the next `n` appends
    pub fn fail_next_appends(&self, n: u32) {
        self.state.lock().failing_appends = n;
    }

    /// Make every stream write fail while set
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Make every stream report a health error while set
    pub fn set_fail_health(&self, fail: bool) {
        self.state.lock().fail_health = fail;
    }

    /// Insert a file directly
    pub fn put_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.state.lock().files.insert(path.into(), contents.into());
    }

    /// Contents of a file, if it exists
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    /// Lines of a file (empty if it does not exist)
    pub fn lines(&self, path: &Path) -> Vec<String> {
        self.contents(path)
            .map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .lines()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All file paths, sorted
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = self.state.lock().files.keys().cloned().collect();
        files.sort();
        files
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl StorageBackend for MemoryStorage {
    fn scheme(&self) -> &str {
        "memory"
    }

    fn create(&self, path: &Path) -> Result<Box<dyn AuditStream>> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Create(path.to_path_buf()));

        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "creation not allowed").into());
        }

        state.files.insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemoryStream::new(path, self.state.clone())))
    }

    fn append(&self, path: &Path) -> Result<Box<dyn AuditStream>> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Append(path.to_path_buf()));

        if !state.append_supported {
            return Err(AuditError::Unsupported(format!(
                "append not supported for {}",
                path.display()
            )));
        }
        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(io::Error::other("append not allowed").into());
        }
        if !state.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
            .into());
        }

        Ok(Box::new(MemoryStream::new(path, self.state.clone())))
    }

    fn has_capability(&self, path: &Path, capability: PathCapability) -> bool {
        let mut state = self.state.lock();
        state
            .calls
            .push(BackendCall::HasCapability(path.to_path_buf(), capability));
        match capability {
            PathCapability::Append => state.append_supported,
            _ => false,
        }
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Exists(path.to_path_buf()));
        Ok(state.files.contains_key(path))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Delete(path.to_path_buf()));
        match state.files.remove(path) {
            Some(_) => Ok(()),
            None => Err(AuditError::NotFound(format!("{}", path.display()))),
        }
    }

    fn create_dirs(&self, path: &Path) -> Result<()> {
        self.state
            .lock()
            .calls
            .push(BackendCall::CreateDirs(path.to_path_buf()));
        Ok(())
    }
}

/// Stream buffering writes until flush
struct MemoryStream {
    path: PathBuf,
    buffer: Vec<u8>,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStream {
    fn new(path: &Path, state: Arc<Mutex<MemoryState>>) -> Self {
        Self {
            path: path.to_path_buf(),
            buffer: Vec::new(),
            state,
        }
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.lock().fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected write failure"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected flush failure"));
        }
        state
            .files
            .entry(self.path.clone())
            .or_default()
            .append(&mut self.buffer);
        Ok(())
    }
}

impl AuditStream for MemoryStream {
    fn check_health(&mut self) -> io::Result<()> {
        if self.state.lock().fail_health {
            return Err(io::Error::other("injected stream error"));
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.flush()
    }
}

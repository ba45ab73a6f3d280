use auditrail_core::{AuditError, AuditStream, PathCapability, Result, StorageBackend};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Local filesystem storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Buffer size for writes
    write_buffer_size: usize,

    /// Whether `close` syncs file data to disk (default: true)
    sync_on_close: bool,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self {
            write_buffer_size: 64 * 1024, // 64KB
            sync_on_close: true,
        }
    }
}

impl LocalStorage {
    /// Create a new local filesystem storage backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the write buffer size
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set whether closing a stream syncs it to disk
    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    fn stream(&self, path: &Path, file: File) -> Box<dyn AuditStream> {
        Box::new(LocalStream {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(self.write_buffer_size, file),
            sync_on_close: self.sync_on_close,
        })
    }
}

impl StorageBackend for LocalStorage {
    fn scheme(&self) -> &str {
        "file"
    }

    fn create(&self, path: &Path) -> Result<Box<dyn AuditStream>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(self.stream(path, file))
    }

    fn append(&self, path: &Path) -> Result<Box<dyn AuditStream>> {
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(self.stream(path, file))
    }

    fn has_capability(&self, _path: &Path, capability: PathCapability) -> bool {
        match capability {
            PathCapability::Append => true,
            _ => false,
        }
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(path.try_exists()?)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(AuditError::NotFound(format!(
                "{}",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn create_dirs(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }
}

/// Buffered stream on a local file
struct LocalStream {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_on_close: bool,
}

impl Write for LocalStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl AuditStream for LocalStream {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.writer.flush()?;
        if self.sync_on_close {
            self.writer.get_ref().sync_data()?;
        }
        tracing::debug!(path = %self.path.display(), "Closed local stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_makes_parents_and_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/audit.log");
        let storage = LocalStorage::new();

        let mut stream = storage.create(&path).unwrap();
        stream.write_all(b"first\n").unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");

        let mut stream = storage.create(&path).unwrap();
        stream.write_all(b"second\n").unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn test_append_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("audit.log");
        let storage = LocalStorage::new();

        assert!(storage.append(&path).is_err());
        assert!(storage.has_capability(&path, PathCapability::Append));

        std::fs::write(&path, "one\n").unwrap();
        let mut stream = storage.append(&path).unwrap();
        stream.write_all(b"two\n").unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_exists_and_delete() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("audit.log");
        let storage = LocalStorage::new();

        assert!(!storage.exists(&path).unwrap());
        std::fs::write(&path, "x").unwrap();
        assert!(storage.exists(&path).unwrap());

        storage.delete(&path).unwrap();
        assert!(!storage.exists(&path).unwrap());
        assert!(matches!(storage.delete(&path), Err(AuditError::NotFound(_))));
    }
}

//! Storage backends for auditrail
//!
//! - [`LocalStorage`]: local disk, buffered writes, append supported everywhere
//! - [`MemoryStorage`]: in-memory files with call recording and fault injection

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::{BackendCall, MemoryStorage};

use auditrail_core::{AuditError, Result, StorageBackend, StorageConfig};
use std::sync::Arc;

/// Open the backend selected by `storage.backendUri`
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.scheme() {
        Some("file") => Arc::new(LocalStorage::new()),
        Some("memory") => Arc::new(MemoryStorage::new()),
        Some(other) => {
            return Err(AuditError::Config(format!(
                "unsupported storage backend '{}' in {}",
                other, config.backend_uri
            )))
        }
        None => {
            return Err(AuditError::Config(format!(
                "storage.backendUri '{}' has no scheme",
                config.backend_uri
            )))
        }
    };

    tracing::info!(
        uri = %config.backend_uri,
        options = config.options.len(),
        "Opened storage backend"
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_backend_by_scheme() {
        let mut config = StorageConfig::default();
        assert_eq!(open_backend(&config).unwrap().scheme(), "file");

        config.backend_uri = "memory://".to_string();
        assert_eq!(open_backend(&config).unwrap().scheme(), "memory");

        config.backend_uri = "hdfs://namenode:8020".to_string();
        assert!(matches!(open_backend(&config), Err(AuditError::Config(_))));

        config.backend_uri = "nowhere".to_string();
        assert!(open_backend(&config).is_err());
    }
}

//! Background columnar conversion of closed log files
//!
//! Each conversion runs on its own detached thread. Nothing here touches the
//! writer's stream state: the source file is already closed and is only read.

use auditrail_core::{observe, ColumnarConverter, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Hands closed log files to a [`ColumnarConverter`]
#[derive(Clone, Default)]
pub struct ConversionDispatcher {
    converter: Option<Arc<dyn ColumnarConverter>>,
}

impl ConversionDispatcher {
    pub fn new(converter: Option<Arc<dyn ColumnarConverter>>) -> Self {
        Self { converter }
    }

    /// Dispatcher that never converts
    pub fn disabled() -> Self {
        Self { converter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.converter.is_some()
    }

    /// Start converting `source` in the background
    ///
    /// Returns the conversion thread, or `None` when no converter is
    /// configured or the thread could not be spawned. Callers normally drop
    /// the handle.
    pub fn dispatch(&self, source: &Path) -> Option<JoinHandle<()>> {
        let converter = self.converter.clone()?;
        let source = source.to_path_buf();

        let spawned = thread::Builder::new()
            .name("auditrail-convert".to_string())
            .spawn({
                let source = source.clone();
                move || {
                    // Outcome is logged and recorded inside
                    let _ = run_conversion(converter.as_ref(), &source);
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(
                    source = %source.display(),
                    error = %e,
                    "Failed to spawn columnar conversion"
                );
                observe::record_conversion(std::time::Duration::ZERO, false);
                None
            }
        }
    }
}

/// Convert `source` on the current thread, logging the outcome
pub fn run_conversion(converter: &dyn ColumnarConverter, source: &Path) -> Result<PathBuf> {
    let start = Instant::now();
    let result = converter.convert(source);
    let elapsed = start.elapsed();
    observe::record_conversion(elapsed, result.is_ok());

    match &result {
        Ok(target) => tracing::info!(
            source = %source.display(),
            target = %target.display(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Converted audit log to columnar format"
        ),
        Err(e) => tracing::error!(
            source = %source.display(),
            error = %e,
            "Columnar conversion failed"
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditrail_core::{columnar_path_for, AuditError};
    use parking_lot::Mutex;

    struct RecordingConverter {
        seen: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl ColumnarConverter for RecordingConverter {
        fn extension(&self) -> &str {
            "col"
        }

        fn convert(&self, source: &Path) -> Result<PathBuf> {
            self.seen.lock().push(source.to_path_buf());
            if self.fail {
                return Err(AuditError::ConversionFailure("schema mismatch".into()));
            }
            Ok(columnar_path_for(source, self.extension()))
        }
    }

    #[test]
    fn test_disabled_dispatcher_does_nothing() {
        let dispatcher = ConversionDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        assert!(dispatcher.dispatch(Path::new("/audit/a.log")).is_none());
    }

    #[test]
    fn test_dispatch_runs_converter_in_background() {
        let converter = Arc::new(RecordingConverter {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let dispatcher = ConversionDispatcher::new(Some(converter.clone()));

        let handle = dispatcher.dispatch(Path::new("/audit/a.log")).unwrap();
        handle.join().unwrap();
        assert_eq!(*converter.seen.lock(), vec![PathBuf::from("/audit/a.log")]);
    }

    #[test]
    fn test_failed_conversion_is_reported() {
        let converter = RecordingConverter {
            seen: Mutex::new(Vec::new()),
            fail: true,
        };
        let result = run_conversion(&converter, Path::new("/audit/a.log"));
        assert!(matches!(result, Err(AuditError::ConversionFailure(_))));
    }
}

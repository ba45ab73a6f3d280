use crate::conversion::ConversionDispatcher;
use crate::rollover::{RolloverScheduler, RolloverTarget};
use crate::stream::{FileStreamManager, RolloverTrigger, StreamSlot};
use auditrail_core::{
    observe, AuditError, AuditPathTemplate, ColumnarConverter, Result, RolloverPolicy,
    StorageBackend, StreamState, WriterConfig,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Audit log writer
///
/// Appends batches of serialized audit records (one per line) to a rolling
/// set of files. Every state change (open, write, error, rollover, close)
/// happens under one mutex, shared with the rollover scheduler.
///
/// # Example
///
/// ```no_run
/// use auditrail_core::{RolloverConfig, WriterConfig};
/// use auditrail_file_log::AuditWriter;
///
/// # fn main() -> auditrail_core::Result<()> {
/// let config = WriterConfig::new("/var/log/audit").with_rollover(RolloverConfig::periodic(3600, 60));
/// let writer = AuditWriter::builder(config).build()?;
///
/// if !writer.log_json([r#"{"user":"alice","action":"read"}"#]) {
///     // Not durably written; retry later
/// }
/// writer.close_writer();
/// # Ok(())
/// # }
/// ```
pub struct AuditWriter {
    slot: Arc<Mutex<StreamSlot>>,
    manager: Arc<FileStreamManager>,
    scheduler: RolloverScheduler,
    closed: AtomicBool,
}

impl AuditWriter {
    /// Create a writer builder
    pub fn builder(config: WriterConfig) -> AuditWriterBuilder {
        AuditWriterBuilder::new(config)
    }

    /// Initialize a writer on `backend`
    ///
    /// Validates `config`, builds the path templates and starts the rollover
    /// scheduler when periodic rollover is enabled.
    pub fn init(
        config: &WriterConfig,
        backend: Arc<dyn StorageBackend>,
        converter: Option<Arc<dyn ColumnarConverter>>,
    ) -> Result<Self> {
        let policy = RolloverPolicy::from_config(&config.rollover)?;
        Self::init_with_policy(config, backend, converter, policy)
    }

    fn init_with_policy(
        config: &WriterConfig,
        backend: Arc<dyn StorageBackend>,
        converter: Option<Arc<dyn ColumnarConverter>>,
        policy: RolloverPolicy,
    ) -> Result<Self> {
        config.validate()?;
        let template = AuditPathTemplate::from_config(&config.destination)?;

        let manager = Arc::new(FileStreamManager::new(
            backend,
            template,
            policy,
            ConversionDispatcher::new(converter),
        ));
        let slot = Arc::new(Mutex::new(StreamSlot::new()));

        let scheduler = RolloverScheduler::start(
            policy,
            Arc::new(RolloverHook {
                slot: slot.clone(),
                manager: manager.clone(),
            }),
        )?;

        tracing::info!(
            directory = %config.destination.directory,
            file_name = %config.destination.file_name_template,
            backend = manager.backend().scheme(),
            periodic_rollover = policy.is_periodic(),
            "Audit writer initialized"
        );

        Ok(Self {
            slot,
            manager,
            scheduler,
            closed: AtomicBool::new(false),
        })
    }

    /// Write a batch of serialized audit records, one per line
    ///
    /// Returns `true` only if every line was written and flushed and the
    /// stream reported no error. On `false` the batch is not guaranteed to
    /// be durable; the next call reopens the same file (append or create)
    /// and the caller may resend. An empty batch is a no-op returning `true`.
    pub fn log_json<I, S>(&self, lines: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batch = Vec::new();
        let mut count = 0u64;
        for line in lines {
            batch.extend_from_slice(line.as_ref().as_bytes());
            batch.push(b'\n');
            count += 1;
        }
        if count == 0 {
            return true;
        }

        let result = self.write_batch(&batch, count);
        observe::record_batch(count, result.is_ok());

        match result {
            Ok(()) => true,
            Err(AuditError::WriterClosed) => {
                tracing::warn!(lines = count, "Audit writer is closed, batch dropped");
                false
            }
            Err(e) => {
                tracing::debug!(lines = count, error = %e, "Audit batch not durably written");
                false
            }
        }
    }

    fn write_batch(&self, batch: &[u8], lines: u64) -> Result<()> {
        let mut slot = self.slot.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(AuditError::WriterClosed);
        }

        self.manager.ensure_stream(&mut slot, Utc::now())?;
        self.manager.write_batch(&mut slot, batch, lines)
    }

    /// Stop the rollover scheduler and close the open file
    ///
    /// Blocks until an in-flight write finishes and the scheduler thread has
    /// exited. Safe to call more than once.
    pub fn close_writer(&self) {
        self.scheduler.stop();

        let mut slot = self.slot.lock();
        let already_closed = self.closed.swap(true, Ordering::SeqCst);
        self.manager.close(&mut slot, RolloverTrigger::Explicit);

        if !already_closed {
            tracing::info!("Audit writer closed");
        }
    }

    /// Snapshot of the stream state
    pub fn state(&self) -> StreamState {
        self.slot.lock().state().clone()
    }

    /// Whether a stream handle is currently held
    pub fn has_open_stream(&self) -> bool {
        self.slot.lock().has_stream()
    }

    /// Resolved path of the current (or reused) log file
    pub fn current_path(&self) -> Option<PathBuf> {
        self.slot
            .lock()
            .state()
            .path()
            .map(|path| path.resolved().to_path_buf())
    }

    pub fn policy(&self) -> &RolloverPolicy {
        self.manager.policy()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Close the file when the writer is dropped without `close_writer`
impl Drop for AuditWriter {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close_writer();
        }
    }
}

/// Bridges the rollover scheduler to the writer's critical section
struct RolloverHook {
    slot: Arc<Mutex<StreamSlot>>,
    manager: Arc<FileStreamManager>,
}

impl RolloverTarget for RolloverHook {
    fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().state().opened_at()
    }

    fn rollover_due(&self) {
        let mut slot = self.slot.lock();
        if self.manager.rollover_due(slot.state(), Utc::now()) {
            self.manager.close(&mut slot, RolloverTrigger::Scheduled);
        }
    }
}

/// Builder for [`AuditWriter`]
pub struct AuditWriterBuilder {
    config: WriterConfig,
    backend: Option<Arc<dyn StorageBackend>>,
    converter: Option<Arc<dyn ColumnarConverter>>,
    policy: Option<RolloverPolicy>,
}

impl AuditWriterBuilder {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            backend: None,
            converter: None,
            policy: None,
        }
    }

    /// Use `backend` instead of the one named by `storage.backendUri`
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Convert each closed file with `converter`
    pub fn with_converter(mut self, converter: Arc<dyn ColumnarConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Use `policy` instead of the one derived from `rollover.*`
    pub fn with_rollover_policy(mut self, policy: RolloverPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<AuditWriter> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => auditrail_storage::open_backend(&self.config.storage)?,
        };
        let policy = match self.policy {
            Some(policy) => policy,
            None => RolloverPolicy::from_config(&self.config.rollover)?,
        };
        AuditWriter::init_with_policy(&self.config, backend, self.converter, policy)
    }
}

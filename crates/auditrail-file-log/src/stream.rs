use crate::conversion::ConversionDispatcher;
use auditrail_core::{
    observe, AuditError, AuditPath, AuditPathTemplate, AuditStream, PathCapability, Result,
    RolloverPolicy, StorageBackend, StreamState, StreamStatus,
};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sequence numbers tried per fresh open after the first candidate
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// How a stream was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Create,
    Append,
}

impl OpenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Create => "create",
            OpenMode::Append => "append",
        }
    }
}

/// Result of [`FileStreamManager::ensure_stream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The stream was already open
    Existing,
    /// A stream was opened
    Opened(OpenMode),
}

/// What caused a stream to be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverTrigger {
    /// The background scheduler found the file expired
    Scheduled,
    /// A write found the file expired
    Inline,
    /// The writer was closed
    Explicit,
}

impl RolloverTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloverTrigger::Scheduled => "scheduled",
            RolloverTrigger::Inline => "inline",
            RolloverTrigger::Explicit => "explicit",
        }
    }
}

/// The live stream handle together with its state
///
/// Always accessed under the writer's mutex; only [`FileStreamManager`]
/// changes it.
pub struct StreamSlot {
    state: StreamState,
    stream: Option<Box<dyn AuditStream>>,
    /// Base path and sequence number of the last freshly minted file
    last_minted: Option<(PathBuf, u32)>,
}

impl Default for StreamSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSlot {
    pub fn new() -> Self {
        Self {
            state: StreamState::new(),
            stream: None,
            last_minted: None,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }
}

/// A fresh path together with where it sits in its base name's sequence
struct MintedPath {
    path: AuditPath,
    base: PathBuf,
    sequence: u32,
}

/// Opens, writes, closes and recovers the output stream
pub struct FileStreamManager {
    backend: Arc<dyn StorageBackend>,
    template: AuditPathTemplate,
    policy: RolloverPolicy,
    conversions: ConversionDispatcher,
}

impl FileStreamManager {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        template: AuditPathTemplate,
        policy: RolloverPolicy,
        conversions: ConversionDispatcher,
    ) -> Self {
        Self {
            backend,
            template,
            policy,
            conversions,
        }
    }

    pub fn policy(&self) -> &RolloverPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Whether the open file in `state` is due for rollover at `now`
    pub fn rollover_due(&self, state: &StreamState, now: DateTime<Utc>) -> bool {
        state.is_open()
            && state
                .opened_at()
                .is_some_and(|opened_at| self.policy.is_expired(opened_at, now))
    }

    /// Make sure a stream is open, opening or reopening one as needed
    ///
    /// - Open and not expired: kept as is.
    /// - Open but expired: closed (inline rollover), then a fresh file is opened.
    /// - Reusing the last file: appended to when it exists and the backend
    ///   supports append, created otherwise.
    /// - Otherwise a fresh path is minted and created.
    ///
    /// On failure the slot moves to `Error` with `reuse_last_log_file` set and
    /// `StreamUnavailable` is returned. When no fresh path could be minted
    /// there is nothing to reuse, and the next call mints again.
    pub fn ensure_stream(&self, slot: &mut StreamSlot, now: DateTime<Utc>) -> Result<EnsureOutcome> {
        if slot.state.is_open() && slot.stream.is_some() {
            if !self.rollover_due(&slot.state, now) {
                return Ok(EnsureOutcome::Existing);
            }
            self.close(slot, RolloverTrigger::Inline);
        }

        let (path, mode, minted) = match slot.state.reuse_path().cloned() {
            Some(path) => match self.reopen_mode(&path) {
                Ok(mode) => (path, mode, None),
                Err(e) => {
                    self.recover_from_error(slot, path, &e);
                    return Err(e);
                }
            },
            None => match self.fresh_path(slot.last_minted.as_ref(), now) {
                Ok(minted) => (
                    minted.path,
                    OpenMode::Create,
                    Some((minted.base, minted.sequence)),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "No fresh audit file name available");
                    slot.state.mark_failed();
                    return Err(e);
                }
            },
        };

        let opened = match mode {
            OpenMode::Create => self
                .backend
                .create_dirs(path.directory())
                .and_then(|_| self.backend.create(path.resolved())),
            OpenMode::Append => self.backend.append(path.resolved()),
        };
        observe::record_stream_open(mode.as_str(), opened.is_ok());

        match opened {
            Ok(stream) => {
                tracing::info!(
                    path = %path,
                    mode = mode.as_str(),
                    "Opened audit log file"
                );
                slot.stream = Some(stream);
                if minted.is_some() {
                    slot.last_minted = minted;
                }
                slot.state.mark_open(path, now);
                Ok(EnsureOutcome::Opened(mode))
            }
            Err(e) => {
                let err = unavailable(path.resolved(), e);
                self.recover_from_error(slot, path, &err);
                Err(err)
            }
        }
    }

    /// Write one pre-rendered batch and check the stream's health
    ///
    /// The batch is written with a single `write_all` followed by a flush. A
    /// failed write, flush or health check moves the slot to `Error` with
    /// `reuse_last_log_file` set and returns `WriteFailure`; nothing is retried.
    pub fn write_batch(&self, slot: &mut StreamSlot, batch: &[u8], lines: u64) -> Result<()> {
        let Some(path) = slot.state.path().cloned().filter(|_| slot.state.is_open()) else {
            return Err(AuditError::InvalidStreamState(slot.state.status()));
        };
        let Some(stream) = slot.stream.as_mut() else {
            return Err(AuditError::InvalidStreamState(slot.state.status()));
        };

        let outcome = stream
            .write_all(batch)
            .and_then(|_| stream.flush())
            .and_then(|_| stream.check_health());

        match outcome {
            Ok(()) => {
                slot.state.record_write(lines, batch.len() as u64);
                tracing::debug!(path = %path, lines, bytes = batch.len(), "Wrote audit batch");
                Ok(())
            }
            Err(e) => {
                let err = AuditError::write_failure(path.resolved(), e);
                self.recover_from_error(slot, path, &err);
                Err(err)
            }
        }
    }

    /// Close the stream, returning the slot to `Closed`
    ///
    /// A cleanly closed file is handed to the columnar converter, and so is a
    /// file left behind by an earlier failure, since it holds acknowledged
    /// lines. Closing never fails: close errors are logged and the state still
    /// moves to `Closed` with `reuse_last_log_file` cleared.
    pub fn close(&self, slot: &mut StreamSlot, trigger: RolloverTrigger) {
        let path = slot.state.path().cloned();
        let lines = slot.state.lines_written();

        if let Some(stream) = slot.stream.take() {
            observe::record_rollover(trigger.as_str());
            match (stream.close(), path) {
                (Ok(()), Some(path)) => {
                    tracing::info!(
                        path = %path,
                        lines,
                        trigger = trigger.as_str(),
                        "Closed audit log file"
                    );
                    self.conversions.dispatch(path.resolved());
                }
                (Ok(()), None) => {}
                (Err(e), path) => {
                    tracing::warn!(
                        path = ?path.map(|p| p.resolved().to_path_buf()),
                        error = %e,
                        trigger = trigger.as_str(),
                        "Audit log file did not close cleanly"
                    );
                }
            }
        } else if slot.state.status() == StreamStatus::Error {
            if let Some(path) = slot.state.reuse_path() {
                self.convert_abandoned(path, trigger);
            }
            tracing::debug!(
                trigger = trigger.as_str(),
                "Discarding failed stream, next open mints a fresh file"
            );
        }

        slot.state.mark_closed();
    }

    /// Drop the stream after a failure and arrange for `path` to be reused
    pub fn recover_from_error(&self, slot: &mut StreamSlot, path: AuditPath, error: &AuditError) {
        if let Some(stream) = slot.stream.take() {
            if let Err(e) = stream.close() {
                tracing::debug!(path = %path, error = %e, "Failed stream did not close cleanly");
            }
        }
        tracing::warn!(
            path = %path,
            error = %error,
            "Audit stream error, next write reuses the same file"
        );
        slot.state.mark_error(path);
    }

    /// Convert a file whose stream was dropped after an error
    fn convert_abandoned(&self, path: &AuditPath, trigger: RolloverTrigger) {
        if !self.conversions.is_enabled() {
            return;
        }
        match self.backend.exists(path.resolved()) {
            Ok(true) => {
                tracing::info!(
                    path = %path,
                    trigger = trigger.as_str(),
                    "Closed audit log file left by a failed stream"
                );
                self.conversions.dispatch(path.resolved());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Could not check failed audit log file");
            }
        }
    }

    /// Decide how to reopen `path` after an error
    fn reopen_mode(&self, path: &AuditPath) -> Result<OpenMode> {
        let exists = self
            .backend
            .exists(path.resolved())
            .map_err(|e| unavailable(path.resolved(), e))?;
        if !exists {
            return Ok(OpenMode::Create);
        }
        if self
            .backend
            .has_capability(path.resolved(), PathCapability::Append)
        {
            return Ok(OpenMode::Append);
        }

        tracing::warn!(
            path = %path,
            backend = self.backend.scheme(),
            "Backend cannot append, recreating the last log file"
        );
        Ok(OpenMode::Create)
    }

    /// Mint a path for a fresh file, adding `.N` when the name is taken
    ///
    /// When `last` names the same base path, numbering resumes after the last
    /// sequence used instead of checking from the start.
    fn fresh_path(&self, last: Option<&(PathBuf, u32)>, now: DateTime<Utc>) -> Result<MintedPath> {
        let base = self.template.resolve(now);
        let first = match last {
            Some((last_base, sequence)) if last_base.as_path() == base.resolved() => {
                sequence.saturating_add(1)
            }
            _ => 0,
        };

        for sequence in first..first.saturating_add(MAX_NAME_ATTEMPTS + 1) {
            let candidate = if sequence == 0 {
                base.clone()
            } else {
                base.with_sequence(sequence)
            };
            let taken = self
                .backend
                .exists(candidate.resolved())
                .map_err(|e| unavailable(candidate.resolved(), e))?;
            if !taken {
                return Ok(MintedPath {
                    path: candidate,
                    base: base.resolved().to_path_buf(),
                    sequence,
                });
            }
        }

        Err(AuditError::stream_unavailable(
            base.resolved(),
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("no free file name after {} attempts", MAX_NAME_ATTEMPTS),
            ),
        ))
    }
}

/// Classify a backend error as `StreamUnavailable` for `path`
fn unavailable(path: &Path, error: AuditError) -> AuditError {
    match error {
        AuditError::Io(source) => AuditError::stream_unavailable(path, source),
        err @ AuditError::StreamUnavailable { .. } => err,
        other => AuditError::stream_unavailable(path, io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditrail_core::{PathTemplate, TemplateContext};
    use auditrail_storage::{BackendCall, MemoryStorage};
    use std::time::Duration;

    fn manager(storage: &MemoryStorage, policy: RolloverPolicy) -> FileStreamManager {
        let template = AuditPathTemplate::new(
            PathTemplate::parse("/audit").unwrap(),
            None,
            PathTemplate::parse("{app_type}.log").unwrap(),
            TemplateContext {
                app_type: "test".to_string(),
                hostname: "host".to_string(),
                pid: 1,
            },
        )
        .unwrap();
        FileStreamManager::new(
            Arc::new(storage.clone()),
            template,
            policy,
            ConversionDispatcher::disabled(),
        )
    }

    fn log_path() -> PathBuf {
        PathBuf::from("/audit/test.log")
    }

    #[test]
    fn test_fresh_open_creates_file() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        let outcome = manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        assert_eq!(outcome, EnsureOutcome::Opened(OpenMode::Create));
        assert!(slot.state().is_open());
        assert_eq!(slot.state().path().unwrap().resolved(), log_path());

        let outcome = manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        assert_eq!(outcome, EnsureOutcome::Existing);
    }

    #[test]
    fn test_fresh_path_skips_taken_names() {
        let storage = MemoryStorage::new();
        storage.put_file("/audit/test.log", "old\n");
        storage.put_file("/audit/test.1.log", "older\n");
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        assert_eq!(
            slot.state().path().unwrap().resolved(),
            Path::new("/audit/test.2.log")
        );
        assert_eq!(storage.lines(&log_path()), vec!["old"]);
    }

    #[test]
    fn test_write_batch_records_counts() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        manager.write_batch(&mut slot, b"a\nb\n", 2).unwrap();
        assert_eq!(slot.state().lines_written(), 2);
        assert_eq!(slot.state().bytes_written(), 4);
        assert_eq!(storage.lines(&log_path()), vec!["a", "b"]);
    }

    #[test]
    fn test_write_without_stream_is_rejected() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        let err = manager.write_batch(&mut slot, b"a\n", 1).unwrap_err();
        assert!(matches!(err, AuditError::InvalidStreamState(StreamStatus::Closed)));
    }

    #[test]
    fn test_health_failure_moves_to_error_and_reuses_path() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        storage.set_fail_health(true);
        let err = manager.write_batch(&mut slot, b"a\n", 1).unwrap_err();
        assert!(matches!(err, AuditError::WriteFailure { .. }));
        assert_eq!(slot.state().status(), StreamStatus::Error);
        assert!(slot.state().reuse_last_log_file());
        assert!(!slot.has_stream());

        storage.set_fail_health(false);
        storage.clear_calls();
        let outcome = manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        assert_eq!(outcome, EnsureOutcome::Opened(OpenMode::Append));
        assert!(storage.calls().contains(&BackendCall::Append(log_path())));
    }

    #[test]
    fn test_reuse_without_append_capability_recreates() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        storage.set_fail_writes(true);
        assert!(manager.write_batch(&mut slot, b"a\n", 1).is_err());
        storage.set_fail_writes(false);
        storage.set_append_supported(false);

        let outcome = manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        assert_eq!(outcome, EnsureOutcome::Opened(OpenMode::Create));
        assert_eq!(slot.state().path().unwrap().resolved(), log_path());
    }

    #[test]
    fn test_expired_stream_rolls_over_inline() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::on_write(Duration::from_secs(60)));
        let mut slot = StreamSlot::new();

        let start = Utc::now();
        manager.ensure_stream(&mut slot, start).unwrap();
        manager.write_batch(&mut slot, b"a\n", 1).unwrap();

        let later = start + chrono::Duration::seconds(61);
        assert!(manager.rollover_due(slot.state(), later));
        let outcome = manager.ensure_stream(&mut slot, later).unwrap();
        assert_eq!(outcome, EnsureOutcome::Opened(OpenMode::Create));
        assert_eq!(
            slot.state().path().unwrap().resolved(),
            Path::new("/audit/test.1.log")
        );
        assert_eq!(storage.lines(&log_path()), vec!["a"]);
    }

    #[test]
    fn test_exhausted_names_leave_nothing_to_reuse() {
        let storage = MemoryStorage::new();
        storage.put_file("/audit/test.log", "closed earlier\n");
        for n in 1..=1000 {
            storage.put_file(format!("/audit/test.{}.log", n), "");
        }
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        for _ in 0..2 {
            let err = manager.ensure_stream(&mut slot, Utc::now()).unwrap_err();
            assert!(matches!(err, AuditError::StreamUnavailable { .. }));
            assert_eq!(slot.state().status(), StreamStatus::Error);
            assert!(!slot.state().reuse_last_log_file());
            assert!(slot.state().path().is_none());
            assert!(!slot.has_stream());
        }
        assert!(!storage
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::Create(_) | BackendCall::Append(_))));

        // A freed name is picked up; the earlier file is never touched
        storage.delete(Path::new("/audit/test.7.log")).unwrap();
        manager.ensure_stream(&mut slot, Utc::now()).unwrap();
        assert_eq!(
            slot.state().path().unwrap().resolved(),
            Path::new("/audit/test.7.log")
        );
        manager.write_batch(&mut slot, b"fresh\n", 1).unwrap();
        assert_eq!(storage.lines(&log_path()), vec!["closed earlier"]);
    }

    #[test]
    fn test_numbering_resumes_after_last_sequence() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::on_write(Duration::from_secs(60)));
        let mut slot = StreamSlot::new();

        let mut now = Utc::now();
        manager.ensure_stream(&mut slot, now).unwrap();
        now += chrono::Duration::seconds(61);
        manager.ensure_stream(&mut slot, now).unwrap();
        assert_eq!(
            slot.state().path().unwrap().resolved(),
            Path::new("/audit/test.1.log")
        );

        storage.clear_calls();
        now += chrono::Duration::seconds(61);
        manager.ensure_stream(&mut slot, now).unwrap();
        assert_eq!(
            slot.state().path().unwrap().resolved(),
            Path::new("/audit/test.2.log")
        );
        let checked: Vec<_> = storage
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::Exists(_)))
            .collect();
        assert_eq!(
            checked,
            vec![BackendCall::Exists(PathBuf::from("/audit/test.2.log"))]
        );
    }

    #[test]
    fn test_close_clears_reuse() {
        let storage = MemoryStorage::new();
        let manager = manager(&storage, RolloverPolicy::disabled());
        let mut slot = StreamSlot::new();

        storage.fail_next_creates(1);
        assert!(manager.ensure_stream(&mut slot, Utc::now()).is_err());
        assert!(slot.state().reuse_last_log_file());

        manager.close(&mut slot, RolloverTrigger::Explicit);
        assert_eq!(slot.state().status(), StreamStatus::Closed);
        assert!(!slot.state().reuse_last_log_file());
        assert!(slot.state().path().is_none());
    }
}

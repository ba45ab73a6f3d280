//! Rolling audit log writer
//!
//! Durably appends serialized audit records (JSON lines) to a rolling set of
//! files on a pluggable [`StorageBackend`](auditrail_core::StorageBackend),
//! and hands closed files to a columnar converter.
//!
//! Features:
//! - One critical section for every stream transition; safe under concurrent callers
//! - Time-based rollover, from a background scheduler and on write
//! - Recovery by reusing the last file (append when the backend supports it)
//! - Collision-free file names (`name.N.ext`) for fresh files
//! - Best-effort background conversion of closed files
//!
//! Delivery is at-least-once: a batch reported as failed may still have
//! reached the file, and a retry can duplicate it.

mod conversion;
mod rollover;
mod stream;
mod writer;

pub use conversion::{run_conversion, ConversionDispatcher};
pub use rollover::{RolloverScheduler, RolloverTarget};
pub use stream::{EnsureOutcome, FileStreamManager, OpenMode, RolloverTrigger, StreamSlot};
pub use writer::{AuditWriter, AuditWriterBuilder};

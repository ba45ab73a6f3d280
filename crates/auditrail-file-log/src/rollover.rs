//! Background rollover timer
//!
//! Wakes every check period and asks its target to roll the open file over
//! once it is older than the rollover interval. The target performs the close
//! under the writer's own lock, so the timer never touches the stream itself.

use auditrail_core::{Result, RolloverPolicy};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receiver of rollover requests
pub trait RolloverTarget: Send + Sync + 'static {
    /// When the current file was opened, if one is open
    fn opened_at(&self) -> Option<DateTime<Utc>>;

    /// The open file is older than the rollover interval
    ///
    /// Called on the scheduler thread. Implementations must re-check the
    /// file's age under their own lock, since a write may have rolled it over
    /// already.
    fn rollover_due(&self);
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    /// Wait up to `timeout`; returns true once stopped
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.condvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// Periodic rollover scheduler
///
/// `stop` joins the timer thread: once it returns, no further
/// `rollover_due` calls are made.
pub struct RolloverScheduler {
    signal: Arc<StopSignal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RolloverScheduler {
    /// Start the scheduler for `policy`
    ///
    /// When the policy is not periodic (scheduler disabled, or no positive
    /// interval) no thread is started and the scheduler never fires.
    pub fn start(policy: RolloverPolicy, target: Arc<dyn RolloverTarget>) -> Result<Self> {
        let signal = Arc::new(StopSignal::default());

        if !policy.is_periodic() {
            tracing::debug!(
                enabled = policy.enabled(),
                interval = ?policy.interval(),
                "Periodic rollover disabled"
            );
            return Ok(Self {
                signal,
                handle: Mutex::new(None),
            });
        }

        let thread_signal = signal.clone();
        let handle = thread::Builder::new()
            .name("auditrail-rollover".to_string())
            .spawn(move || run(policy, target.as_ref(), &thread_signal))?;

        tracing::info!(
            interval = ?policy.interval(),
            check_period = ?policy.check_period(),
            "Rollover scheduler started"
        );

        Ok(Self {
            signal,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Whether the timer thread is running
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Stop the scheduler and wait for the timer thread to exit
    ///
    /// Idempotent.
    pub fn stop(&self) {
        self.signal.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Rollover scheduler thread panicked");
            } else {
                tracing::info!("Rollover scheduler stopped");
            }
        }
    }
}

impl Drop for RolloverScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(policy: RolloverPolicy, target: &dyn RolloverTarget, signal: &StopSignal) {
    loop {
        if signal.wait(policy.check_period()) {
            break;
        }

        let Some(opened_at) = target.opened_at() else {
            continue;
        };
        if policy.is_expired(opened_at, Utc::now()) {
            tracing::debug!(%opened_at, "Open audit file expired, requesting rollover");
            target.rollover_due();
        }
    }
}

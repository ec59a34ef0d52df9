//! State shared by the daemon's loops.

use jobq_config::DaemonConfig;
use jobq_scheduler::Scheduler;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Why a daemon stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitReason {
    #[default]
    Stop,
    /// The daemon should be replaced by a fresh instance.
    Restart,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Stop => f.write_str("stop"),
            ExitReason::Restart => f.write_str("restart"),
        }
    }
}

/// Shared daemon state.
pub struct DaemonState {
    pub config: DaemonConfig,
    pub scheduler: Arc<Scheduler>,
    sequence: AtomicU64,
    active: AtomicBool,
    shutdown: CancellationToken,
    exit_reason: Mutex<ExitReason>,
}

impl DaemonState {
    pub fn new(config: DaemonConfig, scheduler: Arc<Scheduler>) -> Self {
        Self {
            config,
            scheduler,
            sequence: AtomicU64::new(0),
            active: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            exit_reason: Mutex::new(ExitReason::Stop),
        }
    }

    /// Sequence number for the next inbound message. Starts at 1.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether the daemon has been asked to stop.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn exit_reason(&self) -> ExitReason {
        *self.exit_reason.lock()
    }

    /// Token cancelled when the daemon stops.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop the daemon's loops. Only the first request sets the exit reason.
    pub fn request_stop(&self, reason: ExitReason) {
        if self.active.swap(false, Ordering::SeqCst) {
            *self.exit_reason.lock() = reason;
            info!(reason = %reason, "Stopping daemon");
        }
        self.shutdown.cancel();
    }
}

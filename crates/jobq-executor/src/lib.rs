//! Process execution for jobq.
//!
//! An [`Executor`] turns a job into a running [`Process`] whose output is
//! spooled to the files named by [`SpoolPaths`]. The dispatch loop owns the
//! process exclusively until it exits or is cancelled.

pub mod error;
pub mod local;
pub mod spool;

pub use error::{ExecError, ExecResult};
pub use local::LocalExecutor;
pub use spool::{SpoolPaths, remove_spool_files};

use async_trait::async_trait;
use jobq_core::Job;
use tokio_util::sync::CancellationToken;

/// How a job's process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit status, or the negated signal number for a killed process.
    pub code: i32,
    /// Whether the process was killed because its job was cancelled.
    pub cancelled: bool,
}

/// Starts job processes.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executor name, for logs.
    fn name(&self) -> &'static str;

    /// Spawn the job's command with stdout and stderr written to `spool`.
    async fn spawn(&self, job: &Job, spool: &SpoolPaths) -> ExecResult<Box<dyn Process>>;
}

/// A running job process.
#[async_trait]
pub trait Process: Send {
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit. Kills it first if `cancel` fires.
    async fn wait(self: Box<Self>, cancel: CancellationToken) -> ExecResult<ExitOutcome>;
}

//! Job scheduling for jobq.
//!
//! The [`Scheduler`] moves pending jobs from the store into running
//! processes and back. Each execution slot is a [`Worker`] running a
//! dispatch loop; a [`WorkQueue`] of job IDs wakes idle workers when new
//! work is submitted. The store stays the source of truth: a wake-up is only
//! a hint to poll it now instead of at the next tick.

pub mod error;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use error::{SchedulerError, SchedulerResult};
pub use queue::WorkQueue;
pub use scheduler::{CancelOutcome, Claim, ClearReport, RunningJob, Scheduler};
pub use worker::Worker;

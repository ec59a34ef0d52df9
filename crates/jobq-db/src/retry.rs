//! Retry policy for lock contention.
//!
//! Every connection runs with a zero busy timeout, so contention surfaces as
//! `SQLITE_BUSY`/`SQLITE_LOCKED` immediately. [`RetryPolicy::run`] is the
//! single place those errors are absorbed: the statement is retried after a
//! fixed delay for as long as the lock is held. Any other error propagates.

use rusqlite::ErrorCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts between two warnings while a statement keeps hitting a lock.
const WARN_EVERY: u64 = 200;

/// Whether an error is caused by another connection holding a lock.
pub fn is_transient(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl RetryPolicy {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(25);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or fails with a non-transient error.
    ///
    /// Blocks the calling thread while waiting; run it on a blocking thread
    /// when called from async code.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let mut attempts: u64 = 0;
        loop {
            match op() {
                Err(e) if is_transient(&e) => {
                    attempts += 1;
                    if attempts % WARN_EVERY == 0 {
                        warn!(operation = what, attempts, "Database still locked, retrying");
                    } else {
                        debug!(operation = what, attempts, error = %e, "Database locked, retrying");
                    }
                    std::thread::sleep(self.delay);
                }
                result => return result,
            }
        }
    }
}

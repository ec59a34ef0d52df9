//! Daemon error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("JobSubmit requires a job")]
    MissingJob,

    #[error("another daemon is already listening on {0}")]
    AlreadyRunning(PathBuf),

    #[error("daemon has been stopped and cannot be started again")]
    Stopped,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error(transparent)]
    Core(#[from] jobq_core::Error),

    #[error(transparent)]
    Config(#[from] jobq_config::ConfigError),

    #[error(transparent)]
    Db(#[from] jobq_db::DbError),

    #[error(transparent)]
    Scheduler(#[from] jobq_scheduler::SchedulerError),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DaemonResult<T> = std::result::Result<T, DaemonError>;

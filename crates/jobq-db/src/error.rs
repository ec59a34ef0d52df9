//! Database error types.

use jobq_core::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("job {id} is already {state}")]
    AlreadyRecorded { id: JobId, state: &'static str },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("a transaction is already in progress")]
    TransactionInProgress,

    #[error("no transaction is in progress")]
    NoTransactionInProgress,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store pool error: {0}")]
    Pool(String),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

//! Execution error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("job has an empty command")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExecResult<T> = std::result::Result<T, ExecError>;

//! Scheduling error types.

use jobq_core::JobId;
use jobq_db::DbError;
use jobq_executor::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job {0} does not exist")]
    UnknownJob(JobId),

    #[error("job {0} has already finished")]
    AlreadyFinished(JobId),

    #[error("failed to start job {id}: {source}")]
    Spawn {
        id: JobId,
        #[source]
        source: ExecError,
    },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

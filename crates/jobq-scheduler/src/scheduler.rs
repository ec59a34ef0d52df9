//! Claiming, running, cancelling and clearing jobs.

use jobq_core::job::timestamp_now;
use jobq_core::{Job, JobId, JobStatus};
use jobq_db::{DbError, StorePool};
use jobq_executor::{Executor, Process, SpoolPaths, remove_spool_files};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{SchedulerError, SchedulerResult, WorkQueue};

/// Exit code recorded for a job that had to be finished without a process.
pub const ABANDONED_EXIT_CODE: i32 = -1;

/// Result of trying to claim the next pending job.
pub enum Claim {
    /// Nothing is pending.
    Idle,
    /// A job was started and must be driven to completion with
    /// [`Scheduler::finish`].
    Started(RunningJob),
    /// A job could not be spawned. It has been marked started without a
    /// process and will not be retried.
    Failed(JobId),
}

/// A started job and the process executing it.
pub struct RunningJob {
    pub job: Job,
    process: Box<dyn Process>,
    cancel: CancellationToken,
}

/// What cancelling a job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and was removed from the queue.
    Removed,
    /// The job's process is being killed.
    Killed,
    /// The job was started but has no live process; it was marked finished.
    Abandoned,
}

/// Outcome of clearing finished jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    /// Requested jobs that were left alone because they have not finished.
    pub unfinished: Vec<JobId>,
    /// Requested jobs that do not exist.
    pub unknown: Vec<JobId>,
}

/// Moves jobs between the store and running processes.
pub struct Scheduler {
    pool: StorePool,
    executor: Arc<dyn Executor>,
    spool_dir: PathBuf,
    wakeups: WorkQueue<JobId>,
    /// Serializes "pick pending job, start it, register it" between slots
    /// and against cancellation.
    claim: tokio::sync::Mutex<()>,
    running: Mutex<HashMap<JobId, CancellationToken>>,
    /// Jobs that failed to spawn and could not be marked started. They stay
    /// pending in the store but are never claimed again by this scheduler.
    unrecorded: Mutex<HashSet<JobId>>,
}

impl Scheduler {
    pub fn new(pool: StorePool, executor: Arc<dyn Executor>, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            executor,
            spool_dir: spool_dir.into(),
            wakeups: WorkQueue::new(),
            claim: tokio::sync::Mutex::new(()),
            running: Mutex::new(HashMap::new()),
            unrecorded: Mutex::new(HashSet::new()),
        }
    }

    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    pub fn wakeups(&self) -> &WorkQueue<JobId> {
        &self.wakeups
    }

    /// Tell idle workers that `id` may be ready to run. Never blocks.
    pub fn wake(&self, id: JobId) {
        self.wakeups.enqueue(id);
    }

    /// Whether the job's process is currently supervised by a worker.
    pub fn is_running(&self, id: JobId) -> bool {
        self.running.lock().contains_key(&id)
    }

    /// Log jobs a previous daemon left started but never finished.
    pub async fn report_orphans(&self) -> SchedulerResult<usize> {
        let orphans = self.pool.run(|store| store.get_running()).await?;
        for job in &orphans {
            warn!(
                job_id = %job.id,
                pid = ?job.pid,
                command = %job.command_line(),
                "Job was running when the previous daemon stopped; cancel it to finish it"
            );
        }
        Ok(orphans.len())
    }

    /// Start the oldest pending job, if any.
    pub async fn claim_next(&self) -> SchedulerResult<Claim> {
        let _claim = self.claim.lock().await;

        let skip = self.unrecorded.lock().clone();
        let limit = skip.len() as i64 + 1;
        let pending = self.pool.run(move |store| store.get_pending(limit)).await?;
        let Some(mut job) = pending.into_iter().find(|job| !skip.contains(&job.id)) else {
            return Ok(Claim::Idle);
        };

        let spool = SpoolPaths::for_job(&self.spool_dir, job.id, job.options.compression);
        job.spool_out = Some(spool.out.clone());
        job.spool_err = Some(spool.err.clone());

        let process = match self.executor.spawn(&job, &spool).await {
            Ok(process) => process,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to spawn job");
                job.start(timestamp_now(), None);
                let record = job.clone();
                if let Err(e) = self.pool.run(move |store| store.mark_started(&record)).await {
                    error!(job_id = %job.id, error = %e, "Failed to record spawn failure");
                    self.unrecorded.lock().insert(job.id);
                }
                return Ok(Claim::Failed(job.id));
            }
        };

        job.start(timestamp_now(), process.pid());
        let record = job.clone();
        // On failure the process is dropped, which kills it, and the job stays pending.
        self.pool.run(move |store| store.mark_started(&record)).await?;

        let cancel = CancellationToken::new();
        self.running.lock().insert(job.id, cancel.clone());

        info!(job_id = %job.id, pid = ?job.pid, executor = self.executor.name(), "Job started");
        Ok(Claim::Started(RunningJob {
            job,
            process,
            cancel,
        }))
    }

    /// Wait for a started job's process and record how it ended.
    pub async fn finish(&self, running: RunningJob) -> SchedulerResult<Job> {
        let RunningJob {
            mut job,
            process,
            cancel,
        } = running;

        let exit_code = match process.wait(cancel).await {
            Ok(outcome) => {
                if outcome.cancelled {
                    info!(job_id = %job.id, exit_code = outcome.code, "Job cancelled");
                }
                outcome.code
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Lost track of job process");
                ABANDONED_EXIT_CODE
            }
        };

        job.finish(exit_code, timestamp_now());
        let record = job.clone();
        let recorded = self.pool.run(move |store| store.mark_finished(&record)).await;
        self.running.lock().remove(&job.id);
        recorded?;

        info!(
            job_id = %job.id,
            exit_code,
            runtime_ms = job.runtime().map(|d| d.num_milliseconds()),
            "Job finished"
        );
        Ok(job)
    }

    /// Cancel a job, whatever state it is in.
    pub async fn cancel(&self, id: JobId) -> SchedulerResult<CancelOutcome> {
        // Holding the claim lock keeps a worker from starting the job while
        // its state is inspected.
        let _claim = self.claim.lock().await;

        let job = self
            .pool
            .run(move |store| store.get_by_id(id))
            .await?
            .ok_or(SchedulerError::UnknownJob(id))?;

        match job.status() {
            JobStatus::Finished => Err(SchedulerError::AlreadyFinished(id)),
            JobStatus::Created | JobStatus::Enqueued => {
                self.pool.run(move |store| store.delete(id)).await?;
                self.unrecorded.lock().remove(&id);
                info!(job_id = %id, "Pending job removed");
                Ok(CancelOutcome::Removed)
            }
            JobStatus::Started => {
                if let Some(token) = self.running.lock().get(&id) {
                    token.cancel();
                    return Ok(CancelOutcome::Killed);
                }

                self.abandon(job).await
            }
        }
    }

    /// Finish a started job that has no process with [`ABANDONED_EXIT_CODE`].
    ///
    /// `job` may be stale: if a worker recorded the real result after it was
    /// read, that result stands and the job counts as already finished.
    async fn abandon(&self, mut job: Job) -> SchedulerResult<CancelOutcome> {
        let id = job.id;
        job.finish(ABANDONED_EXIT_CODE, timestamp_now());
        match self.pool.run(move |store| store.mark_finished(&job)).await {
            Ok(()) => {
                warn!(job_id = %id, "Job had no live process; marked finished");
                Ok(CancelOutcome::Abandoned)
            }
            Err(DbError::AlreadyRecorded { .. }) => Err(SchedulerError::AlreadyFinished(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete finished jobs and their spool files.
    ///
    /// With no IDs every finished job is removed. Otherwise only the listed
    /// jobs are, and those that are unknown or not finished are reported.
    pub async fn clear(&self, ids: Vec<JobId>) -> SchedulerResult<ClearReport> {
        let (removed_jobs, report) = if ids.is_empty() {
            self.pool
                .run(|store| {
                    store.transaction(|store| {
                        let finished = store.get_finished(0)?;
                        let removed = store.delete_finished()?;
                        let report = ClearReport {
                            removed,
                            ..Default::default()
                        };
                        Ok((finished, report))
                    })
                })
                .await?
        } else {
            self.pool
                .run(move |store| {
                    store.transaction(|store| {
                        let mut report = ClearReport::default();
                        let mut removed_jobs = Vec::new();
                        for id in ids {
                            match store.get_by_id(id)? {
                                None => report.unknown.push(id),
                                Some(job) if !job.is_finished() => report.unfinished.push(id),
                                Some(job) => {
                                    report.removed += store.delete(id)?;
                                    removed_jobs.push(job);
                                }
                            }
                        }
                        Ok((removed_jobs, report))
                    })
                })
                .await?
        };

        for job in &removed_jobs {
            remove_spool_files(job).await;
        }
        info!(removed = report.removed, "Cleared finished jobs");
        Ok(report)
    }
}

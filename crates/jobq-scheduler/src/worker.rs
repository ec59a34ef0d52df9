//! Dispatch loop for one execution slot.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Claim, Scheduler};

/// A worker that claims and executes jobs, one at a time.
pub struct Worker {
    slot: usize,
    scheduler: Arc<Scheduler>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(
        slot: usize,
        scheduler: Arc<Scheduler>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            slot,
            scheduler,
            poll_interval,
            shutdown,
        }
    }

    /// Run the dispatch loop until shutdown.
    ///
    /// Shutdown is only observed between jobs: a running process is waited
    /// for, not killed.
    pub async fn run(self) {
        info!(slot = self.slot, "Starting worker");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.scheduler.claim_next().await {
                Ok(Claim::Started(running)) => {
                    let id = running.job.id;
                    if let Err(e) = self.scheduler.finish(running).await {
                        warn!(slot = self.slot, job_id = %id, error = %e, "Failed to record job result");
                    }
                    continue;
                }
                Ok(Claim::Failed(id)) => {
                    debug!(slot = self.slot, job_id = %id, "Skipping job that failed to start");
                    continue;
                }
                Ok(Claim::Idle) => {}
                Err(e) => {
                    warn!(slot = self.slot, error = %e, "Failed to claim job");
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                id = self.scheduler.wakeups().dequeue() => {
                    debug!(slot = self.slot, job_id = %id, "Woken up");
                }
            }
        }

        info!(slot = self.slot, "Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobq_core::{Job, JobId, JobOptions};
    use jobq_db::{RetryPolicy, StorePool};
    use jobq_executor::LocalExecutor;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;

    fn scheduler(dir: &TempDir) -> Arc<Scheduler> {
        let pool = StorePool::open(&dir.path().join("jobq.db"), 4, RetryPolicy::default()).unwrap();
        let spool = dir.path().join("spool");
        std::fs::create_dir_all(&spool).unwrap();
        Arc::new(Scheduler::new(pool, Arc::new(LocalExecutor::new()), spool))
    }

    async fn submit(scheduler: &Scheduler, args: &[&str], options: JobOptions) -> JobId {
        let mut job = Job::new(args.iter().map(|s| s.to_string()).collect(), options).unwrap();
        let id = scheduler
            .pool()
            .run(move |store| store.submit(&mut job))
            .await
            .unwrap();
        scheduler.wake(id);
        id
    }

    async fn wait_finished(scheduler: &Scheduler, ids: &[JobId]) -> Vec<Job> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let jobs = scheduler.pool().run(|store| store.get_all()).await.unwrap();
            let done: Vec<Job> = jobs
                .into_iter()
                .filter(|j| ids.contains(&j.id) && j.is_finished())
                .collect();
            if done.len() == ids.len() {
                return done;
            }
            assert!(Instant::now() < deadline, "jobs did not finish in time");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn spawn_workers(scheduler: &Arc<Scheduler>, slots: usize) -> CancellationToken {
        let shutdown = CancellationToken::new();
        for slot in 0..slots {
            let worker = Worker::new(
                slot,
                Arc::clone(scheduler),
                Duration::from_secs(60),
                shutdown.clone(),
            );
            tokio::spawn(worker.run());
        }
        shutdown
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lists_etc() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let shutdown = spawn_workers(&scheduler, 1);

        let options = JobOptions {
            directory: Some(PathBuf::from("/etc")),
            ..Default::default()
        };
        let id = submit(&scheduler, &["/bin/ls", "-lh"], options).await;

        let job = wait_finished(&scheduler, &[id]).await.remove(0);
        assert_eq!(job.exit_code, Some(0));
        assert!(job.started.unwrap() < job.ended.unwrap());
        let listing = std::fs::read_to_string(job.spool_out.unwrap()).unwrap();
        assert!(!listing.is_empty());

        shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_slot_never_overlaps() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let shutdown = spawn_workers(&scheduler, 1);

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(submit(&scheduler, &["sleep", "0.1"], JobOptions::default()).await);
        }

        let mut jobs = wait_finished(&scheduler, &ids).await;
        jobs.sort_by_key(|j| j.id);
        for pair in jobs.windows(2) {
            assert!(pair[0].ended.unwrap() <= pair[1].started.unwrap());
        }

        shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slots_share_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let shutdown = spawn_workers(&scheduler, 3);

        let mut ids = Vec::new();
        for i in 0..9 {
            let arg = i.to_string();
            ids.push(submit(&scheduler, &["echo", arg.as_str()], JobOptions::default()).await);
        }

        let jobs = wait_finished(&scheduler, &ids).await;
        assert_eq!(jobs.len(), 9);
        assert!(jobs.iter().all(|j| j.exit_code == Some(0)));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_ticker_finds_jobs_without_wakeup() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let shutdown = CancellationToken::new();
        let worker = Worker::new(
            0,
            Arc::clone(&scheduler),
            Duration::from_millis(50),
            shutdown.clone(),
        );
        tokio::spawn(worker.run());

        let mut job = Job::new(vec!["true".to_string()], JobOptions::default()).unwrap();
        let id = scheduler
            .pool()
            .run(move |store| store.submit(&mut job))
            .await
            .unwrap();

        wait_finished(&scheduler, &[id]).await;
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let shutdown = CancellationToken::new();
        let worker = Worker::new(0, scheduler, Duration::from_secs(60), shutdown.clone());
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

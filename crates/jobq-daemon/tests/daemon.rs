//! End-to-end tests over the daemon socket.

use jobq_config::DaemonConfig;
use jobq_core::{Job, JobId, JobOptions, JobStatus, Message};
use jobq_daemon::{Client, Daemon, DaemonError, ExitReason};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn config(dir: &TempDir) -> DaemonConfig {
    let mut config = DaemonConfig::with_base_dir("test", dir.path().join("data"));
    config.socket = dir.path().join("jobq.socket");
    config.poll_interval = Duration::from_millis(500);
    config.max_read_errors = 3;
    config
}

async fn started(dir: &TempDir) -> Daemon {
    let mut daemon = Daemon::open(config(dir)).unwrap();
    daemon.start().await.unwrap();
    daemon
}

async fn client(dir: &TempDir) -> Client {
    Client::connect(&dir.path().join("jobq.socket")).await.unwrap()
}

fn job(args: &[&str]) -> Job {
    Job::new(
        args.iter().map(|s| s.to_string()).collect(),
        JobOptions::default(),
    )
    .unwrap()
}

async fn wait_for(client: &mut Client, id: JobId, status: JobStatus) -> Job {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let response = client.job_status(id).await.unwrap();
        assert!(!response.is_error(), "{}", response.status);
        let job = response.jobs.unwrap().remove(0);
        if job.status() == status {
            return job;
        }
        assert!(Instant::now() < deadline, "job {} never reached {}", id, status);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_runs_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut client = client(&dir).await;

    let mut ls = job(&["/bin/ls", "-lh"]);
    ls.options.directory = Some(PathBuf::from("/etc"));
    let response = client.submit(ls).await.unwrap();
    assert!(!response.is_error(), "{}", response.status);
    let id = response.job_id.unwrap();
    assert!(response.status.contains(&id.to_string()));

    let job = wait_for(&mut client, id, JobStatus::Finished).await;
    assert_eq!(job.exit_code, Some(0));
    assert!(job.started.unwrap() < job.ended.unwrap());
    let listing = std::fs::read_to_string(job.spool_out.unwrap()).unwrap();
    assert!(!listing.is_empty());

    let status = client.queue_status().await.unwrap();
    assert_eq!(status.jobs.unwrap().len(), 1);

    daemon.stop();
    assert_eq!(daemon.wait().await, ExitReason::Stop);
}

#[tokio::test]
async fn test_sequence_numbers_increase() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut first = client(&dir).await;
    let mut second = client(&dir).await;

    let a = first.queue_status().await.unwrap().sequence;
    let b = second.queue_status().await.unwrap().sequence;
    let c = first.queue_status().await.unwrap().sequence;
    assert!(a < b && b < c);

    daemon.stop();
    daemon.wait().await;
}

#[tokio::test]
async fn test_unknown_request_keeps_connection_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut client = client(&dir).await;

    let message = Message {
        timestamp: jobq_core::job::timestamp_now(),
        job: None,
        request: "JobFrobnicate 12".to_string(),
    };
    let response = client
        .send_raw(serde_json::to_vec(&message).unwrap())
        .await
        .unwrap();
    assert!(response.is_error());
    assert!(response.status.len() > "Error: ".len());

    let response = client.queue_status().await.unwrap();
    assert!(!response.is_error());

    daemon.stop();
    daemon.wait().await;
}

#[tokio::test]
async fn test_malformed_frames_close_connection_after_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut client = client(&dir).await;

    // Errors must be consecutive: a good message resets the count.
    for _ in 0..2 {
        let response = client.send_raw(&b"not json"[..]).await.unwrap();
        assert!(response.is_error());
    }
    assert!(!client.queue_status().await.unwrap().is_error());

    for _ in 0..3 {
        let response = client.send_raw(&b"{\"Request\": 5}"[..]).await.unwrap();
        assert!(response.is_error());
    }
    assert!(client.queue_status().await.is_err());

    daemon.stop();
    daemon.wait().await;
}

#[tokio::test]
async fn test_submit_without_job_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut client = client(&dir).await;

    let response = client
        .request(jobq_core::Request::JobSubmit, None)
        .await
        .unwrap();
    assert!(response.is_error());
    assert!(response.job_id.is_none());

    let response = client.job_status(JobId::new(41)).await.unwrap();
    assert!(response.is_error());

    daemon.stop();
    daemon.wait().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_share_one_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;

    let submitters: Vec<_> = (0..2)
        .map(|_| {
            let socket = dir.path().join("jobq.socket");
            tokio::spawn(async move {
                let mut client = Client::connect(&socket).await.unwrap();
                let mut ids = Vec::new();
                for _ in 0..2 {
                    let response = client.submit(job(&["sleep", "0.1"])).await.unwrap();
                    ids.push(response.job_id.unwrap());
                }
                ids
            })
        })
        .collect();

    let mut ids = Vec::new();
    for submitter in submitters {
        ids.extend(submitter.await.unwrap());
    }

    let mut client = client(&dir).await;
    let mut jobs = Vec::new();
    for id in ids {
        jobs.push(wait_for(&mut client, id, JobStatus::Finished).await);
    }
    jobs.sort_by_key(|j| j.started);
    for pair in jobs.windows(2) {
        assert!(pair[0].ended.unwrap() <= pair[1].started.unwrap());
    }

    daemon.stop();
    daemon.wait().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut client = client(&dir).await;

    let running = client.submit(job(&["sleep", "30"])).await.unwrap().job_id.unwrap();
    let queued = client.submit(job(&["true"])).await.unwrap().job_id.unwrap();
    wait_for(&mut client, running, JobStatus::Started).await;

    let response = client.cancel(queued).await.unwrap();
    assert!(!response.is_error(), "{}", response.status);
    assert!(client.job_status(queued).await.unwrap().is_error());

    let response = client.cancel(running).await.unwrap();
    assert!(!response.is_error(), "{}", response.status);
    let killed = wait_for(&mut client, running, JobStatus::Finished).await;
    assert_eq!(killed.exit_code, Some(-9));

    assert!(client.cancel(running).await.unwrap().is_error());

    let response = client.clear(vec![]).await.unwrap();
    assert!(response.status.contains("Cleared 1"), "{}", response.status);
    assert!(client.queue_status().await.unwrap().jobs.unwrap().is_empty());

    daemon.stop();
    daemon.wait().await;
}

#[tokio::test]
async fn test_stop_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut client = client(&dir).await;

    let response = client.stop().await.unwrap();
    assert!(!response.is_error());

    let reason = tokio::time::timeout(Duration::from_secs(5), daemon.wait())
        .await
        .unwrap();
    assert_eq!(reason, ExitReason::Stop);
    assert!(!daemon.is_active());
    assert!(!dir.path().join("jobq.socket").exists());
}

#[tokio::test]
async fn test_restart_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    let mut client = client(&dir).await;

    client.restart().await.unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(5), daemon.wait())
        .await
        .unwrap();
    assert_eq!(reason, ExitReason::Restart);

    // A fresh daemon on the same store starts counting again.
    let mut daemon = started(&dir).await;
    let mut client = self::client(&dir).await;
    assert_eq!(client.queue_status().await.unwrap().sequence, 1);
    daemon.stop();
    daemon.wait().await;
}

#[tokio::test]
async fn test_start_is_idempotent_and_stopped_daemon_stays_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = started(&dir).await;
    daemon.start().await.unwrap();
    assert!(daemon.is_active());

    daemon.stop();
    daemon.wait().await;
    assert!(matches!(daemon.start().await, Err(DaemonError::Stopped)));
}

#[tokio::test]
async fn test_second_daemon_refuses_live_socket() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = started(&dir).await;

    let mut second = Daemon::open(config(&dir)).unwrap();
    assert!(matches!(
        second.start().await,
        Err(DaemonError::AlreadyRunning(_))
    ));

    first.stop();
    first.wait().await;
}

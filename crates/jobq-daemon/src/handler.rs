//! Request handling.

use jobq_core::job::timestamp_now;
use jobq_core::{Job, JobId, Message, Request, Response};
use jobq_scheduler::{CancelOutcome, ClearReport};
use tracing::{debug, warn};

use crate::{DaemonError, DaemonResult, DaemonState, ExitReason};

/// The reply to one message, and what the daemon should do once it is sent.
#[derive(Debug)]
pub struct Reply {
    pub response: Response,
    pub then: Option<ExitReason>,
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self {
            response,
            then: None,
        }
    }
}

/// Execute one message. Failures become an error status; they never end the
/// connection.
pub async fn handle_message(state: &DaemonState, sequence: u64, message: Message) -> Reply {
    let request = match message.parse_request() {
        Ok(request) => request,
        Err(e) => {
            warn!(sequence, request = %message.request, error = %e, "Rejected request");
            return Response::error(sequence, e).into();
        }
    };

    debug!(sequence, request = %request, "Handling request");
    let name = request.name();
    match execute(state, sequence, request, message.job).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(sequence, request = name, error = %e, "Request failed");
            Response::error(sequence, e).into()
        }
    }
}

async fn execute(
    state: &DaemonState,
    sequence: u64,
    request: Request,
    job: Option<Job>,
) -> DaemonResult<Reply> {
    let reply = match request {
        Request::JobSubmit => {
            let job = job.ok_or(DaemonError::MissingJob)?;
            submit(state, sequence, job).await?.into()
        }
        Request::JobCancel(id) => {
            let status = match state.scheduler.cancel(id).await? {
                CancelOutcome::Removed => format!("Job {} removed from the queue", id),
                CancelOutcome::Killed => format!("Job {} is being killed", id),
                CancelOutcome::Abandoned => format!("Job {} had no running process, marked finished", id),
            };
            Response::ok(sequence, status).into()
        }
        Request::JobClear(ids) => {
            let report = state.scheduler.clear(ids).await?;
            Response::ok(sequence, clear_status(&report)).into()
        }
        Request::JobQueryStatus(id) => {
            let job = state
                .scheduler
                .pool()
                .run(move |store| store.get_by_id(id))
                .await?
                .ok_or_else(|| jobq_core::Error::NotFound(format!("job {}", id)))?;
            let status = format!("Job {} is {}", id, job.status());
            Response::ok(sequence, status).with_jobs(vec![job]).into()
        }
        Request::QueueQueryStatus => {
            let jobs = state.scheduler.pool().run(|store| store.get_all()).await?;
            let status = format!("{} job(s) in queue {}", jobs.len(), state.config.queue);
            Response::ok(sequence, status).with_jobs(jobs).into()
        }
        Request::MonitorStop => Reply {
            response: Response::ok(sequence, "Daemon is stopping"),
            then: Some(ExitReason::Stop),
        },
        Request::MonitorRestart => Reply {
            response: Response::ok(sequence, "Daemon is restarting"),
            then: Some(ExitReason::Restart),
        },
    };
    Ok(reply)
}

async fn submit(state: &DaemonState, sequence: u64, job: Job) -> DaemonResult<Response> {
    // Only the command and options come from the client; the lifecycle
    // starts fresh.
    let mut job = Job::new(job.command, job.options)?;
    job.submitted = Some(timestamp_now());

    let id: JobId = state
        .scheduler
        .pool()
        .run(move |store| store.submit(&mut job))
        .await?;
    state.scheduler.wake(id);

    Ok(Response::ok(sequence, format!("Job {} submitted", id)).with_job_id(id))
}

fn clear_status(report: &ClearReport) -> String {
    let mut status = format!("Cleared {} finished job(s)", report.removed);
    if !report.unfinished.is_empty() {
        status.push_str(&format!("; not finished: {}", join_ids(&report.unfinished)));
    }
    if !report.unknown.is_empty() {
        status.push_str(&format!("; unknown: {}", join_ids(&report.unknown)));
    }
    status
}

fn join_ids(ids: &[JobId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

//! Client/daemon wire envelopes and the request catalogue.
//!
//! Every frame a client sends is a [`Message`]; every frame the daemon sends
//! back is a [`Response`]. The `Request` field of a message is a shell-like
//! token string whose first token names the operation. It is parsed once, at
//! the protocol boundary, into the closed [`Request`] enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::job::timestamp_now;
use crate::{Error, Job, JobId, Result};

/// Prefix of every status that reports a failure.
pub const ERROR_STATUS_PREFIX: &str = "Error: ";

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    pub request: String,
}

impl Message {
    pub fn new(request: &Request, job: Option<Job>) -> Self {
        Self {
            timestamp: timestamp_now(),
            job,
            request: request.to_string(),
        }
    }

    /// Parse the request string of this message.
    pub fn parse_request(&self) -> Result<Request> {
        self.request.parse()
    }
}

/// The daemon's reply to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub timestamp: DateTime<Utc>,
    /// Sequence number shared with the message this answers.
    pub sequence: u64,
    /// Human readable outcome.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<Job>>,
    /// ID assigned to a submitted job.
    #[serde(rename = "JobID", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl Response {
    pub fn ok(sequence: u64, status: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp_now(),
            sequence,
            status: status.into(),
            jobs: None,
            job_id: None,
        }
    }

    pub fn error(sequence: u64, message: impl fmt::Display) -> Self {
        Self::ok(sequence, format!("{}{}", ERROR_STATUS_PREFIX, message))
    }

    pub fn with_jobs(mut self, jobs: Vec<Job>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_job_id(mut self, id: JobId) -> Self {
        self.job_id = Some(id);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status.starts_with(ERROR_STATUS_PREFIX)
    }
}

/// Operations the daemon understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Persist the message's job and schedule it.
    JobSubmit,
    /// Cancel one job, whatever its state.
    JobCancel(JobId),
    /// Remove finished jobs; all of them when no IDs are given.
    JobClear(Vec<JobId>),
    /// Report a single job.
    JobQueryStatus(JobId),
    /// Report every job in the store.
    QueueQueryStatus,
    MonitorStop,
    MonitorRestart,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::JobSubmit => "JobSubmit",
            Request::JobCancel(_) => "JobCancel",
            Request::JobClear(_) => "JobClear",
            Request::JobQueryStatus(_) => "JobQueryStatus",
            Request::QueueQueryStatus => "QueueQueryStatus",
            Request::MonitorStop => "MonitorStop",
            Request::MonitorRestart => "MonitorRestart",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Request::JobCancel(id) | Request::JobQueryStatus(id) => write!(f, " {}", id),
            Request::JobClear(ids) => {
                for id in ids {
                    write!(f, " {}", id)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for Request {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tokens = shlex::split(s)
            .ok_or_else(|| Error::Protocol(format!("cannot tokenize request {:?}", s)))?;
        let (op, args) = tokens
            .split_first()
            .ok_or_else(|| Error::Protocol("empty request".to_string()))?;

        match op.as_str() {
            "JobSubmit" => no_args(op, args).map(|_| Request::JobSubmit),
            "JobCancel" => single_id(op, args).map(Request::JobCancel),
            "JobClear" => parse_ids(op, args).map(Request::JobClear),
            "JobQueryStatus" => single_id(op, args).map(Request::JobQueryStatus),
            "QueueQueryStatus" => no_args(op, args).map(|_| Request::QueueQueryStatus),
            "MonitorStop" => no_args(op, args).map(|_| Request::MonitorStop),
            "MonitorRestart" => no_args(op, args).map(|_| Request::MonitorRestart),
            other => Err(Error::Protocol(format!("invalid request type {:?}", other))),
        }
    }
}

fn no_args(op: &str, args: &[String]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Error::Protocol(format!(
            "{} takes no arguments, got {}",
            op,
            args.len()
        )))
    }
}

fn single_id(op: &str, args: &[String]) -> Result<JobId> {
    match parse_ids(op, args)?.as_slice() {
        [id] => Ok(*id),
        _ => Err(Error::Protocol(format!("{} takes exactly one job ID", op))),
    }
}

fn parse_ids(op: &str, args: &[String]) -> Result<Vec<JobId>> {
    args.iter()
        .map(|arg| {
            arg.parse::<JobId>()
                .ok()
                .filter(JobId::is_assigned)
                .ok_or_else(|| Error::Protocol(format!("{}: invalid job ID {:?}", op, arg)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobOptions;

    #[test]
    fn test_parse_bare_operations() {
        assert_eq!("JobSubmit".parse::<Request>().unwrap(), Request::JobSubmit);
        assert_eq!(
            "QueueQueryStatus".parse::<Request>().unwrap(),
            Request::QueueQueryStatus
        );
        assert_eq!("MonitorStop".parse::<Request>().unwrap(), Request::MonitorStop);
        assert_eq!(
            "MonitorRestart".parse::<Request>().unwrap(),
            Request::MonitorRestart
        );
        assert_eq!("JobClear".parse::<Request>().unwrap(), Request::JobClear(vec![]));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            "JobCancel 12".parse::<Request>().unwrap(),
            Request::JobCancel(JobId::new(12))
        );
        assert_eq!(
            "JobClear 1 '2' 3".parse::<Request>().unwrap(),
            Request::JobClear(vec![JobId::new(1), JobId::new(2), JobId::new(3)])
        );
        assert_eq!(
            "  JobQueryStatus   9 ".parse::<Request>().unwrap(),
            Request::JobQueryStatus(JobId::new(9))
        );
    }

    #[test]
    fn test_parse_rejects_bad_requests() {
        for bad in [
            "",
            "   ",
            "JobFrobnicate",
            "jobsubmit",
            "JobCancel",
            "JobCancel 1 2",
            "JobCancel zero",
            "JobCancel 0",
            "JobClear -4",
            "QueueQueryStatus now",
            "JobCancel '5",
        ] {
            assert!(
                matches!(bad.parse::<Request>(), Err(Error::Protocol(_))),
                "expected protocol error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_display_parses_back() {
        for request in [
            Request::JobSubmit,
            Request::JobCancel(JobId::new(4)),
            Request::JobClear(vec![]),
            Request::JobClear(vec![JobId::new(1), JobId::new(8)]),
            Request::JobQueryStatus(JobId::new(2)),
            Request::QueueQueryStatus,
            Request::MonitorStop,
            Request::MonitorRestart,
        ] {
            assert_eq!(request.to_string().parse::<Request>().unwrap(), request);
        }
    }

    #[test]
    fn test_message_envelope() {
        let job = Job::new(vec!["/bin/true".to_string()], JobOptions::default()).unwrap();
        let msg = Message::new(&Request::JobSubmit, Some(job));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["Request"], "JobSubmit");
        assert!(value["Timestamp"].is_string());
        assert_eq!(value["Job"]["Cmd"][0], "/bin/true");

        let bare = Message::new(&Request::QueueQueryStatus, None);
        let text = serde_json::to_string(&bare).unwrap();
        assert!(!text.contains("Job\""));
        assert!(!text.contains('\n'));
        assert_eq!(bare.parse_request().unwrap(), Request::QueueQueryStatus);
    }

    #[test]
    fn test_response_envelope() {
        let response = Response::ok(3, "Job 7 submitted").with_job_id(JobId::new(7));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["Sequence"], 3);
        assert_eq!(value["Status"], "Job 7 submitted");
        assert_eq!(value["JobID"], 7);
        assert!(value.get("Jobs").is_none());
        assert!(!response.is_error());

        let failed = Response::error(4, "no such job");
        assert_eq!(failed.status, "Error: no such job");
        assert!(failed.is_error());
    }
}

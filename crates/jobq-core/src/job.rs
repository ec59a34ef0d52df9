//! Jobs and their lifecycle.
//!
//! A job is created by a client, enqueued once the store has assigned it an
//! ID, started by a dispatch loop and finished when its process exits.

use chrono::{DateTime, SubsecRound, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, JobId, Result};

/// Current time at the precision the store persists (microseconds).
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// How spooled output is written to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Compression {
    #[default]
    #[display("none")]
    None,
    #[display("gzip")]
    Gzip,
}

impl std::str::FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "no" | "off" => Ok(Compression::None),
            "gzip" | "gz" | "yes" => Ok(Compression::Gzip),
            other => Err(Error::InvalidInput(format!(
                "unknown compression policy: {}",
                other
            ))),
        }
    }
}

/// Options fixed at job creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JobOptions {
    /// Working directory of the process. Inherits the daemon's if unset.
    pub directory: Option<PathBuf>,
    /// Maximum run time. Advisory only, nothing enforces it yet.
    pub max_duration: Option<Duration>,
    /// Spool compression policy.
    pub compression: Compression,
    /// Scheduling niceness passed to `nice -n`.
    pub niceness: i32,
}

/// Lifecycle state, derived from the job's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum JobStatus {
    #[display("created")]
    Created,
    #[display("enqueued")]
    Enqueued,
    #[display("started")]
    Started,
    #[display("finished")]
    Finished,
}

/// A batch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    #[serde(rename = "ID", default)]
    pub id: JobId,
    #[serde(rename = "Cmd")]
    pub command: Vec<String>,
    #[serde(default)]
    pub options: JobOptions,
    #[serde(default)]
    pub submitted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(rename = "PID", default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub spool_out: Option<PathBuf>,
    #[serde(default)]
    pub spool_err: Option<PathBuf>,
}

impl Job {
    /// Create a job that has not been submitted yet.
    pub fn new(command: Vec<String>, options: JobOptions) -> Result<Self> {
        match command.first() {
            None => {
                return Err(Error::InvalidInput("command must not be empty".to_string()));
            }
            Some(program) if program.is_empty() => {
                return Err(Error::InvalidInput("program name must not be empty".to_string()));
            }
            Some(_) => {}
        }

        Ok(Self {
            id: JobId::UNASSIGNED,
            command,
            options,
            submitted: None,
            started: None,
            ended: None,
            exit_code: None,
            pid: None,
            spool_out: None,
            spool_err: None,
        })
    }

    /// Program to execute.
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    /// The command as a shell-quoted line, for logs and listings.
    pub fn command_line(&self) -> String {
        shlex::try_join(self.command.iter().map(String::as_str))
            .unwrap_or_else(|_| self.command.join(" "))
    }

    pub fn status(&self) -> JobStatus {
        if self.ended.is_some() {
            JobStatus::Finished
        } else if self.started.is_some() {
            JobStatus::Started
        } else if self.id.is_assigned() {
            JobStatus::Enqueued
        } else {
            JobStatus::Created
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended.is_some()
    }

    /// Record the start of the job's process.
    pub fn start(&mut self, at: DateTime<Utc>, pid: Option<u32>) {
        self.started = Some(at);
        self.pid = pid;
    }

    /// Record the end of the job's process.
    ///
    /// `ended` is kept strictly after `started`, even when the clock did not
    /// advance between the two transitions.
    pub fn finish(&mut self, exit_code: i32, at: DateTime<Utc>) {
        let ended = match self.started {
            Some(started) if at <= started => started + chrono::Duration::microseconds(1),
            _ => at,
        };
        self.ended = Some(ended);
        self.exit_code = Some(exit_code);
    }

    /// Time between start and end, once both are known.
    pub fn runtime(&self) -> Option<chrono::Duration> {
        Some(self.ended? - self.started?)
    }
}

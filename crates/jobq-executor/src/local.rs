//! Local subprocess executor.

use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use jobq_core::{Compression, Job, JobId};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ExecError, ExecResult, ExitOutcome, Executor, Process, SpoolPaths};

/// Runs jobs as child processes of the daemon.
#[derive(Debug, Default, Clone)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Program and arguments to execute, with the niceness prefix applied.
    fn command_line(job: &Job) -> ExecResult<(String, Vec<String>)> {
        let (program, args) = job
            .command
            .split_first()
            .ok_or(ExecError::EmptyCommand)?;
        if program.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        if job.options.niceness == 0 {
            return Ok((program.clone(), args.to_vec()));
        }

        let mut nice_args = vec![
            "-n".to_string(),
            job.options.niceness.to_string(),
            program.clone(),
        ];
        nice_args.extend_from_slice(args);
        Ok(("nice".to_string(), nice_args))
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn spawn(&self, job: &Job, spool: &SpoolPaths) -> ExecResult<Box<dyn Process>> {
        let (program, args) = Self::command_line(job)?;

        let mut cmd = Command::new(&program);
        cmd.args(&args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(dir) = &job.options.directory {
            cmd.current_dir(dir);
        }

        match spool.compression {
            Compression::None => {
                let out = tokio::fs::File::create(&spool.out).await?.into_std().await;
                let err = tokio::fs::File::create(&spool.err).await?.into_std().await;
                cmd.stdout(Stdio::from(out)).stderr(Stdio::from(err));
            }
            Compression::Gzip => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        let mut copiers = Vec::new();
        if spool.compression == Compression::Gzip {
            if let Some(stdout) = child.stdout.take() {
                copiers.push(tokio::spawn(compress_into(stdout, spool.out.clone())));
            }
            if let Some(stderr) = child.stderr.take() {
                copiers.push(tokio::spawn(compress_into(stderr, spool.err.clone())));
            }
        }

        info!(
            job_id = %job.id,
            pid = ?pid,
            command = %job.command_line(),
            "Spawned job process"
        );

        Ok(Box::new(LocalProcess {
            job_id: job.id,
            child,
            pid,
            copiers,
        }))
    }
}

struct LocalProcess {
    job_id: JobId,
    child: Child,
    pid: Option<u32>,
    copiers: Vec<JoinHandle<std::io::Result<u64>>>,
}

#[async_trait]
impl Process for LocalProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn wait(mut self: Box<Self>, cancel: CancellationToken) -> ExecResult<ExitOutcome> {
        let (status, cancelled) = tokio::select! {
            status = self.child.wait() => (status?, false),
            _ = cancel.cancelled() => {
                info!(job_id = %self.job_id, pid = ?self.pid, "Killing cancelled job");
                if let Err(e) = self.child.start_kill() {
                    warn!(job_id = %self.job_id, error = %e, "Failed to signal job process");
                }
                (self.child.wait().await?, true)
            }
        };

        for copier in self.copiers.drain(..) {
            match copier.await {
                Ok(Ok(bytes)) => debug!(job_id = %self.job_id, bytes, "Spool stream closed"),
                Ok(Err(e)) => warn!(job_id = %self.job_id, error = %e, "Spool write failed"),
                Err(e) => warn!(job_id = %self.job_id, error = %e, "Spool task failed"),
            }
        }

        let code = exit_code(status);
        debug!(job_id = %self.job_id, code, cancelled, "Job process exited");
        Ok(ExitOutcome { code, cancelled })
    }
}

/// Exit status as a single integer: the exit code, or the negated signal
/// number for a process killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

async fn compress_into(mut reader: impl AsyncRead + Unpin, path: PathBuf) -> std::io::Result<u64> {
    let file = tokio::fs::File::create(&path).await?;
    let mut encoder = GzipEncoder::new(file);
    let copied = tokio::io::copy(&mut reader, &mut encoder).await?;
    encoder.shutdown().await?;
    Ok(copied)
}

//! Job commands.

use anyhow::{Context, Result};
use jobq_core::{Compression, Job, JobId, JobOptions, Response};
use jobq_daemon::Client;
use std::path::PathBuf;

pub async fn submit(
    client: &mut Client,
    command: Vec<String>,
    directory: Option<PathBuf>,
    compression: Compression,
    niceness: i32,
) -> Result<Response> {
    let directory = match directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let options = JobOptions {
        directory: Some(directory),
        compression,
        niceness,
        ..JobOptions::default()
    };
    let job = Job::new(command, options)?;
    Ok(client.submit(job).await?)
}

pub async fn status(client: &mut Client, id: Option<JobId>) -> Result<Response> {
    let response = match id {
        Some(id) => client.job_status(id).await?,
        None => client.queue_status().await?,
    };
    Ok(response)
}

/// Render jobs as a plain text table, one line per job.
pub fn table(jobs: &[Job]) -> String {
    let mut out = format!(
        "{:>6}  {:<9}  {:>5}  {:<19}  {:>9}  {}\n",
        "ID", "STATUS", "EXIT", "SUBMITTED", "RUNTIME", "COMMAND"
    );
    for job in jobs {
        let exit = job
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());
        let submitted = job
            .submitted
            .map(|at| {
                at.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        let runtime = job
            .runtime()
            .map(|d| format!("{:.2}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:>6}  {:<9}  {:>5}  {:<19}  {:>9}  {}\n",
            job.id,
            job.status().to_string(),
            exit,
            submitted,
            runtime,
            job.command_line()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_table_shows_one_line_per_job() {
        let mut done = Job::new(vec!["ls".into(), "-lh".into()], JobOptions::default()).unwrap();
        done.id = JobId::new(3);
        done.submitted = Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        done.start(Utc.timestamp_opt(1_700_000_001, 0).unwrap(), Some(42));
        done.finish(2, Utc.timestamp_opt(1_700_000_003, 500_000_000).unwrap());

        let mut waiting = Job::new(vec!["true".into()], JobOptions::default()).unwrap();
        waiting.id = JobId::new(4);
        waiting.submitted = Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        let table = table(&[done, waiting]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("COMMAND"));
        assert!(lines[1].contains("finished"));
        assert!(lines[1].contains("2.50s"));
        assert!(lines[1].ends_with("ls -lh"));
        assert!(lines[2].contains("enqueued"));
        assert!(lines[2].ends_with("true"));
    }
}

//! Spool file naming.

use jobq_core::{Compression, Job, JobId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Where a job's stdout and stderr are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolPaths {
    pub out: PathBuf,
    pub err: PathBuf,
    pub compression: Compression,
}

impl SpoolPaths {
    /// Spool files of job `id` inside `dir`. Unique per job.
    pub fn for_job(dir: &Path, id: JobId, compression: Compression) -> Self {
        let suffix = match compression {
            Compression::None => "",
            Compression::Gzip => ".gz",
        };
        Self {
            out: dir.join(format!("out.{}{}", id, suffix)),
            err: dir.join(format!("err.{}{}", id, suffix)),
            compression,
        }
    }
}

/// Delete a job's spool files. Files that are already gone are ignored.
pub async fn remove_spool_files(job: &Job) {
    for path in [&job.spool_out, &job.spool_err].into_iter().flatten() {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(job_id = %job.id, path = %path.display(), error = %e, "Failed to remove spool file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobq_core::JobOptions;

    #[test]
    fn test_paths_derive_from_id() {
        let plain = SpoolPaths::for_job(Path::new("/spool"), JobId::new(12), Compression::None);
        assert_eq!(plain.out, PathBuf::from("/spool/out.12"));
        assert_eq!(plain.err, PathBuf::from("/spool/err.12"));

        let gz = SpoolPaths::for_job(Path::new("/spool"), JobId::new(12), Compression::Gzip);
        assert_eq!(gz.out, PathBuf::from("/spool/out.12.gz"));
        assert_ne!(gz.out, gz.err);
    }

    #[tokio::test]
    async fn test_remove_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SpoolPaths::for_job(dir.path(), JobId::new(1), Compression::None);
        std::fs::write(&paths.out, b"output").unwrap();

        let mut job = Job::new(vec!["true".to_string()], JobOptions::default()).unwrap();
        job.spool_out = Some(paths.out.clone());
        job.spool_err = Some(paths.err.clone());

        remove_spool_files(&job).await;
        assert!(!paths.out.exists());
    }
}

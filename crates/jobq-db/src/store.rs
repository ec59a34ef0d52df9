//! The job store.

use chrono::{DateTime, Utc};
use jobq_core::job::timestamp_now;
use jobq_core::{Job, JobId};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::query::Query;
use crate::retry::RetryPolicy;
use crate::schema::{PRAGMAS, SCHEMA};
use crate::{DbError, DbResult};

/// One connection to the job database.
///
/// A handle supports at most one explicit transaction at a time. It is not
/// meant to be shared: give each concurrent user its own handle, usually
/// through a [`StorePool`](crate::StorePool).
pub struct Store {
    conn: Connection,
    retry: RetryPolicy,
    path: PathBuf,
    in_transaction: bool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

impl Store {
    /// Open or create the database at `path` and make sure the schema exists.
    pub fn open(path: &Path, retry: RetryPolicy) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::ZERO)?;
        conn.set_prepared_statement_cache_capacity(Query::ALL.len());
        retry.run("pragmas", || conn.execute_batch(PRAGMAS))?;

        let mut store = Self {
            conn,
            retry,
            path: path.to_path_buf(),
            in_transaction: false,
        };

        store.begin()?;
        let created = store
            .retry
            .run("schema", || store.conn.execute_batch(SCHEMA));
        match created {
            Ok(()) => store.commit()?,
            Err(e) => {
                store.rollback()?;
                return Err(e.into());
            }
        }

        debug!(path = %path.display(), "Opened job store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Start an explicit transaction, taking the write lock up front.
    pub fn begin(&mut self) -> DbResult<()> {
        if self.in_transaction {
            return Err(DbError::TransactionInProgress);
        }
        self.retry
            .run("begin", || self.conn.execute_batch("BEGIN IMMEDIATE"))?;
        self.in_transaction = true;
        Ok(())
    }

    pub fn commit(&mut self) -> DbResult<()> {
        if !self.in_transaction {
            return Err(DbError::NoTransactionInProgress);
        }
        self.retry
            .run("commit", || self.conn.execute_batch("COMMIT"))?;
        self.in_transaction = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        if !self.in_transaction {
            return Err(DbError::NoTransactionInProgress);
        }
        self.retry
            .run("rollback", || self.conn.execute_batch("ROLLBACK"))?;
        self.in_transaction = false;
        Ok(())
    }

    /// Run `f` inside an explicit transaction, committing if it succeeds and
    /// rolling back if it fails.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> DbResult<T>) -> DbResult<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Persist a new job and write the generated ID back into it.
    ///
    /// The submission time is stamped now unless the caller already set it.
    pub fn submit(&mut self, job: &mut Job) -> DbResult<JobId> {
        if job.id.is_assigned() {
            return Err(DbError::InvalidData(format!(
                "job {} was already submitted",
                job.id
            )));
        }

        let submitted = *job.submitted.get_or_insert_with(timestamp_now);
        let cmd = serde_json::to_string(&job.command)?;
        let options = serde_json::to_string(&job.options)?;

        let id: i64 = self.retry.run("submit", || {
            let mut stmt = self.conn.prepare_cached(Query::JobSubmit.sql())?;
            stmt.query_row(params![submitted.timestamp_micros(), cmd, options], |row| {
                row.get(0)
            })
        })?;

        job.id = JobId::new(id);
        info!(job_id = %job.id, command = %job.command_line(), "Job submitted");
        Ok(job.id)
    }

    /// Record the start time, process ID and spool files of a job.
    pub fn mark_started(&mut self, job: &Job) -> DbResult<()> {
        let started = job
            .started
            .ok_or_else(|| DbError::InvalidData(format!("job {} has no start time", job.id)))?;
        let pid = job.pid.map(i64::from);
        let spool_out = job.spool_out.as_deref().map(path_text);
        let spool_err = job.spool_err.as_deref().map(path_text);

        let updated = self.execute(
            Query::JobStart,
            params![
                started.timestamp_micros(),
                pid,
                spool_out,
                spool_err,
                job.id.get()
            ],
        )?;
        self.expect_transition(updated, job.id, "started")
    }

    /// Record the end time and exit code of a job.
    pub fn mark_finished(&mut self, job: &Job) -> DbResult<()> {
        let ended = job
            .ended
            .ok_or_else(|| DbError::InvalidData(format!("job {} has no end time", job.id)))?;
        let exit_code = job
            .exit_code
            .ok_or_else(|| DbError::InvalidData(format!("job {} has no exit code", job.id)))?;

        let updated = self.execute(
            Query::JobFinish,
            params![ended.timestamp_micros(), exit_code, job.id.get()],
        )?;
        self.expect_transition(updated, job.id, "finished")
    }

    /// Look up one job. A missing job is `None`, not an error.
    pub fn get_by_id(&mut self, id: JobId) -> DbResult<Option<Job>> {
        let row = self.retry.run("get_by_id", || {
            let mut stmt = self.conn.prepare_cached(Query::JobGetById.sql())?;
            stmt.query_row(params![id.get()], JobRow::from_row)
                .optional()
        })?;
        row.map(JobRow::into_job).transpose()
    }

    /// Jobs not yet started, oldest first. `limit <= 0` means no limit.
    pub fn get_pending(&mut self, limit: i64) -> DbResult<Vec<Job>> {
        self.query_jobs(Query::JobGetPending, params![sql_limit(limit)])
    }

    /// Jobs started but not finished.
    pub fn get_running(&mut self) -> DbResult<Vec<Job>> {
        self.query_jobs(Query::JobGetRunning, params![])
    }

    /// Jobs not finished, whether started or not.
    pub fn get_unfinished(&mut self) -> DbResult<Vec<Job>> {
        self.query_jobs(Query::JobGetUnfinished, params![])
    }

    /// Finished jobs, most recently ended first. `limit <= 0` means no limit.
    pub fn get_finished(&mut self, limit: i64) -> DbResult<Vec<Job>> {
        self.query_jobs(Query::JobGetFinished, params![sql_limit(limit)])
    }

    /// Every job, in submission order.
    pub fn get_all(&mut self) -> DbResult<Vec<Job>> {
        self.query_jobs(Query::JobGetAll, params![])
    }

    /// Remove one job. Returns the number of rows removed.
    pub fn delete(&mut self, id: JobId) -> DbResult<usize> {
        self.execute(Query::JobDelete, params![id.get()])
    }

    /// Remove every finished job. Returns the number of rows removed.
    pub fn delete_finished(&mut self) -> DbResult<usize> {
        self.execute(Query::JobDeleteFinished, params![])
    }

    /// A lifecycle update touches exactly one row. When it touches none the
    /// job is either missing or already past that state; the stored row is
    /// never rewritten.
    fn expect_transition(&mut self, updated: usize, id: JobId, state: &'static str) -> DbResult<()> {
        if updated > 0 {
            return Ok(());
        }
        match self.get_by_id(id)? {
            Some(_) => Err(DbError::AlreadyRecorded { id, state }),
            None => Err(DbError::NotFound(format!("job {}", id))),
        }
    }

    fn execute(&self, query: Query, params: &[&dyn ToSql]) -> DbResult<usize> {
        let changed = self.retry.run(query_name(query), || {
            let mut stmt = self.conn.prepare_cached(query.sql())?;
            stmt.execute(params)
        })?;
        Ok(changed)
    }

    fn query_jobs(&self, query: Query, params: &[&dyn ToSql]) -> DbResult<Vec<Job>> {
        let rows = self.retry.run(query_name(query), || {
            let mut stmt = self.conn.prepare_cached(query.sql())?;
            let rows = stmt
                .query_map(params, JobRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })?;
        rows.into_iter().map(JobRow::into_job).collect()
    }
}

fn query_name(query: Query) -> &'static str {
    match query {
        Query::JobSubmit => "submit",
        Query::JobStart => "mark_started",
        Query::JobFinish => "mark_finished",
        Query::JobGetById => "get_by_id",
        Query::JobGetPending => "get_pending",
        Query::JobGetRunning => "get_running",
        Query::JobGetUnfinished => "get_unfinished",
        Query::JobGetFinished => "get_finished",
        Query::JobGetAll => "get_all",
        Query::JobDelete => "delete",
        Query::JobDeleteFinished => "delete_finished",
    }
}

fn sql_limit(limit: i64) -> i64 {
    // SQLite treats a negative LIMIT as unbounded.
    if limit <= 0 { -1 } else { limit }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A raw `job` row, decoded into a [`Job`] outside the statement borrow.
struct JobRow {
    id: i64,
    submitted: i64,
    started: Option<i64>,
    ended: Option<i64>,
    exit_code: Option<i32>,
    pid: Option<i64>,
    cmd: String,
    options: String,
    spool_out: Option<String>,
    spool_err: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            submitted: row.get(1)?,
            started: row.get(2)?,
            ended: row.get(3)?,
            exit_code: row.get(4)?,
            pid: row.get(5)?,
            cmd: row.get(6)?,
            options: row.get(7)?,
            spool_out: row.get(8)?,
            spool_err: row.get(9)?,
        })
    }

    fn into_job(self) -> DbResult<Job> {
        let pid = self
            .pid
            .map(|pid| {
                u32::try_from(pid)
                    .map_err(|_| DbError::InvalidData(format!("job {}: bad pid {}", self.id, pid)))
            })
            .transpose()?;

        Ok(Job {
            id: JobId::new(self.id),
            command: serde_json::from_str(&self.cmd)?,
            options: serde_json::from_str(&self.options)?,
            submitted: Some(from_micros(self.submitted)?),
            started: self.started.map(from_micros).transpose()?,
            ended: self.ended.map(from_micros).transpose()?,
            exit_code: self.exit_code,
            pid,
            spool_out: self.spool_out.map(PathBuf::from),
            spool_err: self.spool_err.map(PathBuf::from),
        })
    }
}

fn from_micros(micros: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| DbError::InvalidData(format!("timestamp out of range: {}", micros)))
}

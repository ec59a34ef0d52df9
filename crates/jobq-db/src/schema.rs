//! Database schema.
//!
//! Timestamps are epoch microseconds. The `CHECK` constraints mirror the job
//! lifecycle: a job can only end after it started, and an ended job always
//! carries an exit code.

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS job (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submitted INTEGER NOT NULL,
    started INTEGER,
    ended INTEGER,
    exitcode INTEGER,
    pid INTEGER,
    cmd TEXT NOT NULL CHECK (json_valid(cmd) AND json_array_length(cmd) > 0),
    options TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(options)),
    spoolout TEXT UNIQUE,
    spoolerr TEXT UNIQUE,
    CHECK (ended IS NULL OR (started IS NOT NULL AND started < ended)),
    CHECK (ended IS NULL OR exitcode IS NOT NULL)
) STRICT;

CREATE INDEX IF NOT EXISTS job_submitted_idx ON job (submitted);
CREATE INDEX IF NOT EXISTS job_ended_idx ON job ((ended IS NOT NULL));
";

/// Connection settings applied before the schema.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
";

//! Catalogue of every SQL statement the store executes.
//!
//! Statements are prepared lazily through the connection's statement cache,
//! keyed by their text, so each entry is compiled at most once per handle.

/// Every `SELECT` reads the columns in the order `JobRow` expects.
macro_rules! select_jobs {
    ($tail:literal) => {
        concat!(
            "SELECT id, submitted, started, ended, exitcode, pid, cmd, options, spoolout, spoolerr ",
            "FROM job ",
            $tail
        )
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    JobSubmit,
    JobStart,
    JobFinish,
    JobGetById,
    JobGetPending,
    JobGetRunning,
    JobGetUnfinished,
    JobGetFinished,
    JobGetAll,
    JobDelete,
    JobDeleteFinished,
}

impl Query {
    pub const ALL: [Query; 11] = [
        Query::JobSubmit,
        Query::JobStart,
        Query::JobFinish,
        Query::JobGetById,
        Query::JobGetPending,
        Query::JobGetRunning,
        Query::JobGetUnfinished,
        Query::JobGetFinished,
        Query::JobGetAll,
        Query::JobDelete,
        Query::JobDeleteFinished,
    ];

    pub fn sql(self) -> &'static str {
        match self {
            Query::JobSubmit => {
                "INSERT INTO job (submitted, cmd, options) VALUES (?1, ?2, ?3) RETURNING id"
            }
            Query::JobStart => {
                "UPDATE job SET started = ?1, pid = ?2, spoolout = ?3, spoolerr = ?4 \
                 WHERE id = ?5 AND started IS NULL"
            }
            Query::JobFinish => {
                "UPDATE job SET ended = ?1, exitcode = ?2 WHERE id = ?3 AND ended IS NULL"
            }
            Query::JobGetById => select_jobs!("WHERE id = ?1"),
            Query::JobGetPending => {
                select_jobs!("WHERE started IS NULL ORDER BY submitted, id LIMIT ?1")
            }
            Query::JobGetRunning => {
                select_jobs!("WHERE started IS NOT NULL AND ended IS NULL ORDER BY started, id")
            }
            Query::JobGetUnfinished => select_jobs!("WHERE ended IS NULL ORDER BY submitted, id"),
            Query::JobGetFinished => {
                select_jobs!("WHERE ended IS NOT NULL ORDER BY ended DESC, id DESC LIMIT ?1")
            }
            Query::JobGetAll => select_jobs!("ORDER BY id"),
            Query::JobDelete => "DELETE FROM job WHERE id = ?1",
            Query::JobDeleteFinished => "DELETE FROM job WHERE ended IS NOT NULL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_is_complete_and_distinct() {
        let texts: HashSet<_> = Query::ALL.iter().map(|q| q.sql()).collect();
        assert_eq!(texts.len(), Query::ALL.len());
    }

    #[test]
    fn test_bounded_queries_take_a_limit() {
        for query in [Query::JobGetPending, Query::JobGetFinished] {
            assert!(query.sql().ends_with("LIMIT ?1"), "{:?}", query);
        }
    }
}

//! Core domain types for the jobq batch daemon.
//!
//! This crate contains:
//! - Job identifiers, jobs and their lifecycle
//! - The client/daemon wire envelopes
//! - The closed set of requests the daemon understands

pub mod error;
pub mod id;
pub mod job;
pub mod protocol;

pub use error::{Error, Result};
pub use id::JobId;
pub use job::{Compression, Job, JobOptions, JobStatus};
pub use protocol::{Message, Request, Response};

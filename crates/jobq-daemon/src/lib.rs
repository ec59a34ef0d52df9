//! The jobq daemon.
//!
//! A [`Daemon`] owns one queue: a store, a Unix socket served by the control
//! loop, and the dispatch loops that run jobs. [`Client`] speaks the same
//! protocol from the other end of the socket.

pub mod client;
pub mod daemon;
pub mod error;
pub mod handler;
pub mod shutdown;
pub mod state;
pub mod wire;

pub use client::Client;
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use state::{DaemonState, ExitReason};

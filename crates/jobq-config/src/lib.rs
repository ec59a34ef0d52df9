//! KDL configuration for the jobq daemon.
//!
//! This crate handles:
//! - Parsing the daemon configuration file (jobqd.kdl)
//! - Deriving per-user, per-queue socket and storage paths

pub mod daemon;
pub mod error;

pub use daemon::{DaemonConfig, default_socket_path, load_daemon_config, parse_daemon_config};
pub use error::{ConfigError, ConfigResult};

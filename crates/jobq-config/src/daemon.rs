//! Daemon configuration parsing.
//!
//! ```kdl
//! queue "default"
//! socket "/tmp/jobq.alice.default.socket"
//! base-dir "/home/alice/.local/share/jobq/default"
//! pool-size 4
//! slots 1
//! poll-interval-ms 5000
//! retry-delay-ms 25
//! max-read-errors 5
//! ```
//!
//! Every node is optional.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_QUEUE: &str = "default";
pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_SLOTS: usize = 1;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(25);
pub const DEFAULT_MAX_READ_ERRORS: u32 = 5;

/// Runtime configuration of one daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Name of the queue; part of the default socket and storage paths.
    pub queue: String,
    /// Unix socket the control loop listens on.
    pub socket: PathBuf,
    /// Directory holding the database and the spool directory.
    pub base_dir: PathBuf,
    /// Number of pre-opened store handles.
    pub pool_size: usize,
    /// Number of jobs executed concurrently.
    pub slots: usize,
    /// How often idle dispatch loops poll the store without a wake-up.
    pub poll_interval: Duration,
    /// Delay before retrying a statement that hit a locked database.
    pub retry_delay: Duration,
    /// Consecutive read/decode errors after which a connection is dropped.
    pub max_read_errors: u32,
}

impl DaemonConfig {
    /// Defaults for `queue`, storing data under the user's data directory.
    pub fn for_queue(queue: &str) -> ConfigResult<Self> {
        let base_dir = dirs::data_local_dir()
            .ok_or(ConfigError::NoBaseDir)?
            .join("jobq")
            .join(queue);
        Ok(Self::with_base_dir(queue, base_dir))
    }

    /// Defaults for `queue`, storing data under `base_dir`.
    pub fn with_base_dir(queue: &str, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue: queue.to_string(),
            socket: default_socket_path(queue),
            base_dir: base_dir.into(),
            pool_size: DEFAULT_POOL_SIZE,
            slots: DEFAULT_SLOTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("jobq.db")
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.base_dir.join("spool")
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue.is_empty() || self.queue.contains(std::path::is_separator) {
            return Err(invalid("queue", "must be a non-empty name without path separators"));
        }
        if self.pool_size == 0 {
            return Err(invalid("pool-size", "must be at least 1"));
        }
        if self.slots == 0 {
            return Err(invalid("slots", "must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll-interval-ms", "must be positive"));
        }
        if self.max_read_errors == 0 {
            return Err(invalid("max-read-errors", "must be at least 1"));
        }
        Ok(())
    }
}

/// Per-user, per-queue socket path: `<tmp>/jobq.<user>.<queue>.socket`.
pub fn default_socket_path(queue: &str) -> PathBuf {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "nobody".to_string());
    std::env::temp_dir().join(format!("jobq.{}.{}.socket", user, queue))
}

/// Read and parse a configuration file.
pub fn load_daemon_config(path: &Path) -> ConfigResult<DaemonConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_daemon_config(&content)
}

/// Parse a daemon configuration from KDL text.
pub fn parse_daemon_config(kdl: &str) -> ConfigResult<DaemonConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut queue = DEFAULT_QUEUE.to_string();
    let mut socket = None;
    let mut base_dir = None;
    let mut pool_size = DEFAULT_POOL_SIZE;
    let mut slots = DEFAULT_SLOTS;
    let mut poll_interval = DEFAULT_POLL_INTERVAL;
    let mut retry_delay = DEFAULT_RETRY_DELAY;
    let mut max_read_errors = DEFAULT_MAX_READ_ERRORS;

    for node in doc.nodes() {
        match node.name().value() {
            "queue" => queue = required_string(node, "queue")?,
            "socket" => socket = Some(PathBuf::from(required_string(node, "socket")?)),
            "base-dir" => base_dir = Some(PathBuf::from(required_string(node, "base-dir")?)),
            "pool-size" => pool_size = required_u64(node, "pool-size")? as usize,
            "slots" => slots = required_u64(node, "slots")? as usize,
            "poll-interval-ms" => {
                poll_interval = Duration::from_millis(required_u64(node, "poll-interval-ms")?)
            }
            "retry-delay-ms" => {
                retry_delay = Duration::from_millis(required_u64(node, "retry-delay-ms")?)
            }
            "max-read-errors" => {
                max_read_errors = u32::try_from(required_u64(node, "max-read-errors")?)
                    .map_err(|_| invalid("max-read-errors", "too large"))?
            }
            other => warn!(node = %other, "Ignoring unknown configuration node"),
        }
    }

    let mut config = match base_dir {
        Some(dir) => DaemonConfig::with_base_dir(&queue, dir),
        None => DaemonConfig::for_queue(&queue)?,
    };
    if let Some(socket) = socket {
        config.socket = socket;
    }
    config.pool_size = pool_size;
    config.slots = slots;
    config.poll_interval = poll_interval;
    config.retry_delay = retry_delay;
    config.max_read_errors = max_read_errors;

    config.validate()?;
    Ok(config)
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// Helper functions for extracting values from KDL nodes

fn first_arg(node: &KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn required_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    match first_arg(node) {
        Some(value) => value
            .as_string()
            .map(|s| s.to_string())
            .ok_or_else(|| invalid(field, "expected a string")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn required_u64(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    match first_arg(node) {
        Some(value) => value
            .as_integer()
            .and_then(|i| u64::try_from(i).ok())
            .ok_or_else(|| invalid(field, "expected a non-negative integer")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

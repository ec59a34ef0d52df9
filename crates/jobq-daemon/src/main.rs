//! jobqd, the jobq daemon.

use anyhow::Context;
use clap::Parser;
use jobq_config::{DaemonConfig, load_daemon_config};
use jobq_daemon::shutdown::install_signal_handler;
use jobq_daemon::{Daemon, ExitReason};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobqd")]
#[command(about = "Local batch job daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (KDL)
    #[arg(short, long, env = "JOBQ_CONFIG")]
    config: Option<PathBuf>,

    /// Queue name, used to derive the default socket and data paths
    #[arg(short, long, env = "JOBQ_QUEUE", conflicts_with = "config")]
    queue: Option<String>,

    /// Socket path
    #[arg(long, env = "JOBQ_SOCKET")]
    socket: Option<PathBuf>,

    /// Directory holding the database and spool files
    #[arg(long, env = "JOBQ_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Number of jobs to run at the same time
    #[arg(long, env = "JOBQ_SLOTS")]
    slots: Option<usize>,

    /// Emit logs as JSON
    #[arg(long, env = "JOBQ_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => load_daemon_config(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => {
                let queue = self
                    .queue
                    .as_deref()
                    .unwrap_or(jobq_config::daemon::DEFAULT_QUEUE);
                match &self.base_dir {
                    Some(dir) => DaemonConfig::with_base_dir(queue, dir),
                    None => DaemonConfig::for_queue(queue)?,
                }
            }
        };

        if let Some(socket) = &self.socket {
            config.socket = socket.clone();
        }
        if let Some(dir) = &self.base_dir {
            config.base_dir = dir.clone();
        }
        if let Some(slots) = self.slots {
            config.slots = slots;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    loop {
        // Re-read the configuration on every restart.
        let config = args.load_config()?;
        let mut daemon = Daemon::open(config).context("failed to open daemon")?;
        daemon.start().await.context("failed to start daemon")?;

        let signals = install_signal_handler(Arc::clone(daemon.state()))?;
        let reason = daemon.wait().await;
        signals.abort();

        match reason {
            ExitReason::Restart => info!("Restarting daemon"),
            ExitReason::Stop => break,
        }
    }

    Ok(())
}

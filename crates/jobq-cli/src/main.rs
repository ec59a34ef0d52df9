//! jobq command line client.

use clap::{Parser, Subcommand};
use jobq_core::{Compression, JobId};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "jobq")]
#[command(about = "Submit and manage batch jobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Daemon socket
    #[arg(long, env = "JOBQ_SOCKET")]
    socket: Option<PathBuf>,

    /// Queue name, used to derive the default socket path
    #[arg(short, long, env = "JOBQ_QUEUE", default_value = jobq_config::daemon::DEFAULT_QUEUE)]
    queue: String,

    /// Print raw JSON responses
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a command to the queue
    Submit {
        /// Working directory (defaults to the current directory)
        #[arg(short = 'C', long)]
        directory: Option<PathBuf>,
        /// Spool compression: none or gzip
        #[arg(long, default_value = "none")]
        compression: Compression,
        /// Niceness adjustment
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        nice: i32,
        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Show every job, or a single one
    Status {
        /// Job ID
        id: Option<JobId>,
    },
    /// Cancel a job
    Cancel {
        /// Job ID
        id: JobId,
    },
    /// Remove finished jobs; all of them when no IDs are given
    Clear {
        /// Job IDs
        ids: Vec<JobId>,
    },
    /// Stop the daemon
    Stop,
    /// Restart the daemon
    Restart,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket = cli
        .socket
        .unwrap_or_else(|| jobq_config::default_socket_path(&cli.queue));
    let mut client = commands::connect(&socket).await?;

    let response = match cli.command {
        Commands::Submit {
            directory,
            compression,
            nice,
            command,
        } => commands::jobs::submit(&mut client, command, directory, compression, nice).await?,
        Commands::Status { id } => commands::jobs::status(&mut client, id).await?,
        Commands::Cancel { id } => client.cancel(id).await?,
        Commands::Clear { ids } => client.clear(ids).await?,
        Commands::Stop => client.stop().await?,
        Commands::Restart => client.restart().await?,
    };

    commands::print_response(&response, cli.json)
}

//! CLI command implementations.

pub mod jobs;

use anyhow::{Context, Result, bail};
use jobq_core::Response;
use jobq_daemon::Client;
use std::path::Path;
use tracing::debug;

pub async fn connect(socket: &Path) -> Result<Client> {
    debug!(socket = %socket.display(), "Connecting to daemon");
    Client::connect(socket)
        .await
        .with_context(|| format!("cannot connect to daemon at {}", socket.display()))
}

/// Print a response; an error status becomes a failing exit.
pub fn print_response(response: &Response, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        if let Some(jobs) = &response.jobs {
            print!("{}", jobs::table(jobs));
        }
        println!("{}", response.status);
    }

    if response.is_error() {
        bail!("request failed");
    }
    Ok(())
}

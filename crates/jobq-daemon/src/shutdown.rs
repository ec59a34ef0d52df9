use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::info;

use crate::{DaemonState, ExitReason};

/// Stop the daemon on SIGTERM or SIGINT.
///
/// The returned task should be aborted once the daemon has stopped for
/// another reason.
pub fn install_signal_handler(state: Arc<DaemonState>) -> std::io::Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
        state.request_stop(ExitReason::Stop);
    }))
}

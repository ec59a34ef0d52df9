//! Daemon lifecycle and the control loop.

use futures::{SinkExt, StreamExt};
use jobq_config::DaemonConfig;
use jobq_core::{Message, Response};
use jobq_db::{RetryPolicy, StorePool};
use jobq_executor::LocalExecutor;
use jobq_scheduler::{Scheduler, Worker};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::handler::handle_message;
use crate::{DaemonError, DaemonResult, DaemonState, ExitReason, wire};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A job queue daemon: one store, one socket, `slots` dispatch loops.
///
/// A daemon is created inactive, becomes active with [`start`](Self::start)
/// and inactive again with [`stop`](Self::stop). It cannot be restarted;
/// open a new one instead.
pub struct Daemon {
    state: Arc<DaemonState>,
    tasks: JoinSet<()>,
}

impl Daemon {
    /// Create the storage directories, open the store pool and build the
    /// scheduler. Nothing runs until [`start`](Self::start).
    pub fn open(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.base_dir)?;
        std::fs::create_dir_all(config.spool_dir())?;

        let pool = StorePool::open(
            &config.database_path(),
            config.pool_size,
            RetryPolicy::new(config.retry_delay),
        )?;
        let scheduler = Arc::new(Scheduler::new(
            pool,
            Arc::new(LocalExecutor::new()),
            config.spool_dir(),
        ));

        info!(
            queue = %config.queue,
            base_dir = %config.base_dir.display(),
            "Opened daemon"
        );
        Ok(Self {
            state: Arc::new(DaemonState::new(config, scheduler)),
            tasks: JoinSet::new(),
        })
    }

    pub fn state(&self) -> &Arc<DaemonState> {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Bind the socket and start the control loop and the dispatch loops.
    ///
    /// Starting an active daemon is logged and otherwise ignored.
    pub async fn start(&mut self) -> DaemonResult<()> {
        if self.state.is_active() {
            error!(queue = %self.state.config.queue, "Daemon is already active");
            return Ok(());
        }
        if self.state.is_stopped() {
            return Err(DaemonError::Stopped);
        }

        let config = &self.state.config;
        let listener = bind(&config.socket).await?;

        match self.state.scheduler.report_orphans().await {
            Ok(0) => {}
            Ok(n) => warn!(count = n, "Found jobs left running by a previous daemon"),
            Err(e) => warn!(error = %e, "Failed to look for orphaned jobs"),
        }

        self.state.activate();
        self.tasks
            .spawn(control_loop(listener, Arc::clone(&self.state)));
        for slot in 0..config.slots {
            let worker = Worker::new(
                slot,
                Arc::clone(&self.state.scheduler),
                config.poll_interval,
                self.state.shutdown().clone(),
            );
            self.tasks.spawn(worker.run());
        }

        info!(
            queue = %config.queue,
            socket = %config.socket.display(),
            slots = config.slots,
            "Daemon started"
        );
        Ok(())
    }

    /// Stop accepting requests and let the dispatch loops wind down.
    ///
    /// Running processes are not killed; [`wait`](Self::wait) returns once
    /// their jobs are recorded as finished.
    pub fn stop(&self) {
        self.state.request_stop(ExitReason::Stop);
    }

    /// Wait until every loop has exited and return why the daemon stopped.
    pub async fn wait(&mut self) -> ExitReason {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Daemon task failed");
            }
        }

        let socket = &self.state.config.socket;
        if let Err(e) = std::fs::remove_file(socket) {
            debug!(socket = %socket.display(), error = %e, "Socket file not removed");
        }

        let reason = self.state.exit_reason();
        info!(reason = %reason, "Daemon stopped");
        reason
    }
}

/// Listen on `path`, replacing a stale socket file left by a dead daemon.
async fn bind(path: &Path) -> DaemonResult<UnixListener> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(DaemonError::AlreadyRunning(path.to_path_buf()));
        }
        debug!(socket = %path.display(), "Removing stale socket");
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(UnixListener::bind(path)?)
}

async fn control_loop(listener: UnixListener, state: Arc<DaemonState>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = state.shutdown().cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    connections.spawn(handle_connection(stream, Arc::clone(&state)));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    while connections.join_next().await.is_some() {}
    debug!("Control loop stopped");
}

/// Serve one client until it disconnects, the daemon stops, or too many
/// consecutive frames fail.
async fn handle_connection(stream: UnixStream, state: Arc<DaemonState>) {
    let mut framed = wire::framed(stream);
    let max_errors = state.config.max_read_errors;
    let mut errors = 0u32;

    loop {
        let frame = tokio::select! {
            _ = state.shutdown().cancelled() => break,
            frame = framed.next() => frame,
        };

        let frame = match frame {
            None => break,
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                // The codec cannot resynchronise after a read error.
                warn!(error = %e, "Failed to read from client");
                break;
            }
        };

        let sequence = state.next_sequence();
        let reply = match wire::decode::<Message>(&frame) {
            Ok(message) => {
                errors = 0;
                handle_message(&state, sequence, message).await
            }
            Err(e) => {
                errors += 1;
                warn!(sequence, errors, error = %e, "Failed to decode message");
                Response::error(sequence, e).into()
            }
        };

        let sent = match wire::encode(&reply.response) {
            Ok(bytes) => framed.send(bytes).await.map_err(DaemonError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(sequence, error = %e, "Failed to send response");
            break;
        }

        if let Some(reason) = reply.then {
            state.request_stop(reason);
            break;
        }
        if errors >= max_errors {
            warn!(errors, "Too many malformed messages, closing connection");
            break;
        }
    }
}

//! Client side of the daemon protocol.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use jobq_core::{Job, JobId, Message, Request, Response};
use std::path::Path;
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use crate::{DaemonError, DaemonResult, wire};

/// A connection to a running daemon.
pub struct Client {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
}

impl Client {
    pub async fn connect(socket: &Path) -> DaemonResult<Self> {
        let stream = UnixStream::connect(socket).await?;
        debug!(socket = %socket.display(), "Connected to daemon");
        Ok(Self {
            framed: wire::framed(stream),
        })
    }

    /// Send one request and wait for its response.
    pub async fn request(&mut self, request: Request, job: Option<Job>) -> DaemonResult<Response> {
        let message = Message::new(&request, job);
        self.send_raw(wire::encode(&message)?).await
    }

    /// Send an arbitrary frame and wait for the response to it.
    pub async fn send_raw(&mut self, frame: impl Into<Bytes>) -> DaemonResult<Response> {
        let frame: Bytes = frame.into();
        self.framed.send(frame).await?;
        match self.framed.next().await {
            Some(frame) => wire::decode(&frame?),
            None => Err(DaemonError::ConnectionClosed),
        }
    }

    pub async fn submit(&mut self, job: Job) -> DaemonResult<Response> {
        self.request(Request::JobSubmit, Some(job)).await
    }

    pub async fn queue_status(&mut self) -> DaemonResult<Response> {
        self.request(Request::QueueQueryStatus, None).await
    }

    pub async fn job_status(&mut self, id: JobId) -> DaemonResult<Response> {
        self.request(Request::JobQueryStatus(id), None).await
    }

    pub async fn cancel(&mut self, id: JobId) -> DaemonResult<Response> {
        self.request(Request::JobCancel(id), None).await
    }

    pub async fn clear(&mut self, ids: Vec<JobId>) -> DaemonResult<Response> {
        self.request(Request::JobClear(ids), None).await
    }

    pub async fn stop(&mut self) -> DaemonResult<Response> {
        self.request(Request::MonitorStop, None).await
    }

    pub async fn restart(&mut self) -> DaemonResult<Response> {
        self.request(Request::MonitorRestart, None).await
    }
}

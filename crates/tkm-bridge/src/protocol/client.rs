//! Control-channel client.
//!
//! The daemon is the connecting side of the control channel. During
//! bootstrap the raw [`ControlClient`] is used sequentially (reset, then
//! limits); afterwards it is wrapped in a [`SharedControlClient`] whose
//! request gate is sized from the `max_requests` ceiling the key manager
//! itself advertised.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tkm_core::Limits;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::codec::Framed;
use tracing::debug;

use super::error::{ProtocolError, ProtocolResult};
use super::framing::FrameCodec;
use super::messages::{decode_message, encode_message, ControlRequest, ControlResponse};

/// Client side of the key manager's control socket.
#[derive(Debug)]
pub struct ControlClient {
    framed: Framed<UnixStream, FrameCodec>,
}

impl ControlClient {
    /// Connect to the key manager's control socket.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the socket cannot be connected;
    /// during bootstrap this surfaces as a fatal initialization error.
    pub async fn connect(path: &Path) -> ProtocolResult<Self> {
        let stream = UnixStream::connect(path).await?;
        debug!(socket = %path.display(), "control channel connected");
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
        })
    }

    /// Tell the key manager to drop state left over from a previous run.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Rejected`] if the key manager refuses, or a
    /// transport/framing error.
    pub async fn reset(&mut self) -> ProtocolResult<()> {
        match self.roundtrip(&ControlRequest::Reset).await? {
            ControlResponse::Ack => Ok(()),
            ControlResponse::Limits(_) => Err(ProtocolError::UnexpectedResponse {
                expected: "ack",
            }),
            ControlResponse::Error { reason } => Err(ProtocolError::Rejected { reason }),
        }
    }

    /// Query the per-category capacities and the request ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Rejected`] if the key manager refuses, or a
    /// transport/framing error.
    pub async fn limits(&mut self) -> ProtocolResult<Limits> {
        match self.roundtrip(&ControlRequest::QueryLimits).await? {
            ControlResponse::Limits(limits) => Ok(limits),
            ControlResponse::Ack => Err(ProtocolError::UnexpectedResponse {
                expected: "limits",
            }),
            ControlResponse::Error { reason } => Err(ProtocolError::Rejected { reason }),
        }
    }

    /// Send one request and wait for its response.
    async fn roundtrip(&mut self, request: &ControlRequest) -> ProtocolResult<ControlResponse> {
        let frame = encode_message(request)?;
        self.framed.send(frame).await?;

        let frame: Bytes = match self.framed.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e),
            None => return Err(ProtocolError::ConnectionClosed),
        };
        decode_message(&frame)
    }

    /// Close the control channel.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the stream refuses an orderly
    /// shutdown.
    pub async fn close(self) -> ProtocolResult<()> {
        let mut stream = self.framed.into_inner();
        stream.shutdown().await?;
        debug!("control channel closed");
        Ok(())
    }
}

/// Concurrency-gated wrapper around the control channel.
///
/// One connection carries all control traffic, so requests serialize on
/// the wire; the semaphore additionally bounds how many callers may be
/// queued or in flight to the ceiling the key manager advertised, giving
/// negotiation workers backpressure instead of an unbounded queue.
#[derive(Debug)]
pub struct SharedControlClient {
    inner: Mutex<ControlClient>,
    gate: Arc<Semaphore>,
}

impl SharedControlClient {
    /// Wrap a connected client, sizing the gate from `limits`.
    ///
    /// A `max_requests` of zero is treated as one: the channel exists, so
    /// at least one request at a time is always admissible.
    #[must_use]
    pub fn new(client: ControlClient, limits: &Limits) -> Self {
        // Ceilings are small by construction; saturating keeps a hostile
        // limits reply from allocating a huge permit count.
        #[allow(clippy::cast_possible_truncation)]
        let permits = (limits.max_requests.min(Semaphore::MAX_PERMITS as u64) as usize).max(1);
        Self {
            inner: Mutex::new(client),
            gate: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Issue one request, waiting for a request slot first.
    ///
    /// # Errors
    ///
    /// Propagates the underlying [`ProtocolError`]; an error reply from
    /// the key manager surfaces as [`ProtocolError::Rejected`].
    pub async fn request(&self, request: &ControlRequest) -> ProtocolResult<ControlResponse> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;
        let mut client = self.inner.lock().await;
        let response = client.roundtrip(request).await?;
        if let ControlResponse::Error { reason } = response {
            return Err(ProtocolError::Rejected { reason });
        }
        Ok(response)
    }

    /// Close the underlying channel.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the stream refuses an orderly
    /// shutdown.
    pub async fn close(self) -> ProtocolResult<()> {
        self.gate.close();
        self.inner.into_inner().close().await
    }
}

//! A live, handshake-established connection to the DGI.
//!
//! The session owns its stream exclusively. Every network call is bounded
//! by the socket timeout, and timeout expiry surfaces as an ordinary
//! transport error.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::FrameCodec;
use crate::error::{ProtocolError, Result};
use crate::message::Message;

#[derive(Debug)]
pub struct Session<S> {
    framed: Framed<S, FrameCodec>,
    io_timeout: Duration,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
            io_timeout,
        }
    }

    /// Deliver the whole buffer before returning.
    ///
    /// Partial writes are retried until every byte is accepted; a write
    /// that accepts nothing means the peer is gone.
    pub async fn send_all(&mut self, bytes: Bytes) -> Result<()> {
        trace!(len = bytes.len(), "sending frame");
        tokio::time::timeout(self.io_timeout, self.framed.send(bytes))
            .await
            .map_err(|_| ProtocolError::Timeout(self.io_timeout))?
    }

    /// Receive exactly one complete message, terminator included.
    pub async fn recv_all(&mut self) -> Result<Bytes> {
        match tokio::time::timeout(self.io_timeout, self.framed.next()).await {
            Err(_) => Err(ProtocolError::Timeout(self.io_timeout)),
            Ok(None) => Err(ProtocolError::ConnectionLost(
                "connection to DGI unexpectedly lost".into(),
            )),
            Ok(Some(frame)) => {
                let frame = frame?;
                trace!(len = frame.len(), "received frame");
                Ok(frame)
            }
        }
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<()> {
        debug!(kind = %message.kind(), "sending message");
        self.send_all(message.encode()).await
    }

    pub async fn recv_message(&mut self) -> Result<Message> {
        let frame = self.recv_all().await?;
        let message = Message::parse(&frame)?;
        debug!(kind = %message.kind(), "received message");
        Ok(message)
    }

    /// Send raw bytes and wait for the single reply.
    pub async fn exchange(&mut self, bytes: Bytes) -> Result<Bytes> {
        self.send_all(bytes).await?;
        self.recv_all().await
    }

    /// Flush and shut down the stream, consuming the session.
    pub async fn close(mut self) -> Result<()> {
        tokio::time::timeout(self.io_timeout, self.framed.close())
            .await
            .map_err(|_| ProtocolError::Timeout(self.io_timeout))?
    }

    /// Tear the session down without flushing, consuming it.
    ///
    /// Anything still buffered for the peer is discarded. The stream gets
    /// a best-effort shutdown and is dropped.
    pub async fn abort(self) {
        let io_timeout = self.io_timeout;
        let mut stream = self.framed.into_inner();
        match tokio::time::timeout(io_timeout, stream.shutdown()).await {
            Ok(Ok(())) => debug!("session aborted"),
            Ok(Err(e)) => debug!("shutdown of aborted session failed: {e}"),
            Err(_) => debug!("shutdown of aborted session timed out"),
        }
    }
}

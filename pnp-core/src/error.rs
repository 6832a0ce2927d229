//! Domain-specific error types for the plug-and-play protocol.
//!
//! All fallible protocol operations return `Result<T, ProtocolError>`.
//! Every variant is either a transport failure (the connection is gone and
//! a new handshake may fix it) or a fatal condition that no amount of
//! retrying will repair. Call sites decide with [`ProtocolError::is_transport`].

use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// The canonical error type for the plug-and-play protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The peer closed the stream, or reported that it timed us out.
    #[error("connection to DGI lost: {0}")]
    ConnectionLost(String),

    /// The socket layer reported an error.
    #[error("transport error: {0}")]
    Io(#[source] std::io::Error),

    /// A network operation exceeded the configured socket timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Protocol Errors ──────────────────────────────────────────
    /// The byte stream violated the framing rules (e.g. two messages
    /// arrived without the first terminator being final).
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    /// A complete message had the wrong structure or referenced
    /// something this controller does not own.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The peer rejected something we sent.
    #[error("sent bad request to DGI: {0}")]
    BadRequest(String),

    /// The peer reported an error on its side.
    #[error("received an error from DGI: {0}")]
    PeerError(String),

    /// A local state machine was driven through an invalid transition.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

impl ProtocolError {
    /// Returns `true` for failures of the underlying connection.
    ///
    /// These are recoverable by tearing down the session and running the
    /// handshake again. Everything else indicates a logic bug in one of
    /// the two peers.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::Io(_) | Self::Timeout(_)
        )
    }

    /// Returns `true` when the run must terminate.
    pub fn is_fatal(&self) -> bool {
        !self.is_transport()
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            // A write that accepts zero bytes or a read that hits EOF
            // mid-message both mean the peer is gone.
            std::io::ErrorKind::WriteZero | std::io::ErrorKind::UnexpectedEof => {
                ProtocolError::ConnectionLost(e.to_string())
            }
            _ => ProtocolError::Io(e),
        }
    }
}

// ── DeviceError ──────────────────────────────────────────────────

/// Errors raised by the device abstraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// A signal name that the device does not expose.
    #[error("invalid signal {signal} on device {device}")]
    NoSuchSignal { device: String, signal: String },

    /// A device name that is not part of the controller's set.
    #[error("device {0} not found in set")]
    NoSuchDevice(String),

    /// A device with this name is already registered.
    #[error("device {0} is already enabled")]
    DuplicateDevice(String),
}

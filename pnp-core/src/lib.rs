//! # pnp-core
//!
//! Client-side engine of the plug-and-play protocol that lets a device
//! controller register with a DGI and exchange state and commands with it.
//!
//! This crate contains:
//! - **Codec**: `FrameCodec`, blank-line delimited framing via `tokio_util`
//! - **Message**: the fixed message vocabulary and its text encoding
//! - **Network**: `Session` over any async stream, `Connector` / `TcpConnector`
//! - **Device**: the `Device` trait and the name-keyed `DeviceSet`
//! - **Protocol**: handshake, work cycle and polite disconnect
//! - **Error**: `ProtocolError`, a typed `thiserror` error hierarchy

pub mod codec;
pub mod device;
pub mod error;
pub mod message;
pub mod network;
pub mod protocol;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{FrameCodec, MAX_FRAME_SIZE, TERMINATOR};
pub use device::{Device, DeviceSet};
pub use error::{DeviceError, ProtocolError, Result};
pub use message::{DeviceInfo, DisconnectResponse, Message, MessageKind, SignalEntry};
pub use network::{ConnectionInfo, Connector, Session, TcpConnector};
pub use protocol::{
    DisconnectOutcome, DisconnectPhase, ProtocolConfig, apply_commands, connect,
    polite_disconnect, report_state, run_cycle, send_to_factory,
};

//! The three phases of a controller's life on the DGI: registration
//! ([`handshake`]), steady-state reporting ([`work`]) and negotiated
//! teardown ([`disconnect`]).

pub mod disconnect;
pub mod handshake;
pub mod work;

use std::time::Duration;

use bytes::Bytes;
use tracing::{info, warn};

use crate::error::Result;
use crate::network::{Connector, Session};

pub use disconnect::{DisconnectOutcome, DisconnectPhase, polite_disconnect};
pub use handshake::connect;
pub use work::{TIMEOUT_INDICATOR, apply_commands, report_state, run_cycle};

/// Protocol settings for one controller run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Controller identity sent in Hello.
    pub name: String,
    /// Bound on every send and receive.
    pub io_timeout: Duration,
    /// Pause between handshake attempts.
    pub hello_delay: Duration,
    /// Idle time at the end of each work cycle.
    pub work_delay: Duration,
    /// Idle time of the extra work cycle run after a rejected disconnect.
    pub reject_delay: Duration,
}

impl ProtocolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            name: "controller".into(),
            io_timeout: Duration::from_secs(10),
            hello_delay: Duration::from_secs(5),
            work_delay: Duration::from_secs(1),
            reject_delay: Duration::from_secs(1),
        }
    }
}

/// Send a raw packet to the adapter factory on a throwaway connection and
/// return its single reply.
///
/// Used to test the factory with hand-written packets outside of any
/// session.
pub async fn send_to_factory<C: Connector>(
    connector: &C,
    packet: Bytes,
    io_timeout: Duration,
) -> Result<Bytes> {
    let stream = connector.connect().await?;
    let mut session = Session::new(stream, io_timeout);
    let reply = session.exchange(packet).await?;
    if let Err(e) = session.close().await {
        warn!("failed to close factory connection: {e}");
    }
    info!(len = reply.len(), "factory responded");
    Ok(reply)
}

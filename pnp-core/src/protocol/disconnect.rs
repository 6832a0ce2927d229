//! Negotiated teardown of a session.
//!
//! The controller may only leave once the DGI agrees. While the request is
//! rejected the controller keeps doing its job, one work cycle per attempt.
//!
//! ```text
//!  Idle ──► RequestPending ──► Accepted   (session closed)
//!                ▲     │
//!                │     ▼
//!                └─ Rejected  (one work cycle)
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::device::{Device, DeviceSet};
use crate::error::{ProtocolError, Result};
use crate::message::{DisconnectResponse, Message};
use crate::network::Session;
use crate::protocol::work::run_cycle;

// ── DisconnectPhase ──────────────────────────────────────────────

/// Where a disconnect negotiation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPhase {
    #[default]
    Idle,
    /// Request sent, waiting for the acknowledgment.
    RequestPending,
    /// The DGI let us go. Terminal.
    Accepted,
    /// The DGI wants one more round of work first.
    Rejected,
}

impl DisconnectPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Transition to `RequestPending`.
    ///
    /// Valid from: `Idle`, `Rejected`.
    pub fn send_request(&mut self) -> Result<()> {
        match self {
            Self::Idle | Self::Rejected => {
                *self = Self::RequestPending;
                Ok(())
            }
            _ => Err(ProtocolError::ProtocolViolation(
                "cannot request disconnect: not in Idle or Rejected state",
            )),
        }
    }

    /// Record the peer's answer.
    ///
    /// Valid from: `RequestPending`.
    pub fn resolve(&mut self, response: DisconnectResponse) -> Result<()> {
        match self {
            Self::RequestPending => {
                *self = match response {
                    DisconnectResponse::Accepted => Self::Accepted,
                    DisconnectResponse::Rejected => Self::Rejected,
                };
                Ok(())
            }
            _ => Err(ProtocolError::ProtocolViolation(
                "cannot resolve disconnect: no request pending",
            )),
        }
    }
}

// ── Outcome ──────────────────────────────────────────────────────

/// How a disconnect attempt ended. Either way the session is gone.
#[derive(Debug)]
pub enum DisconnectOutcome {
    /// The DGI agreed and the session was closed politely.
    Accepted { extra_cycles: u32 },
    /// The connection failed along the way and was dropped.
    ClosedImpolitely {
        extra_cycles: u32,
        cause: ProtocolError,
    },
}

impl DisconnectOutcome {
    pub fn extra_cycles(&self) -> u32 {
        match self {
            Self::Accepted { extra_cycles } | Self::ClosedImpolitely { extra_cycles, .. } => {
                *extra_cycles
            }
        }
    }

    pub fn is_polite(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

async fn close_impolitely<S>(
    session: Session<S>,
    cause: ProtocolError,
    extra_cycles: u32,
) -> DisconnectOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    warn!("DGI communication error: {cause}");
    warn!("closing connection impolitely");
    session.abort().await;
    DisconnectOutcome::ClosedImpolitely {
        extra_cycles,
        cause,
    }
}

/// Ask the DGI to end the session and keep working until it agrees.
///
/// Consumes the session. Transport failures are not errors here: the
/// connection is closed impolitely and the outcome says so. Only protocol
/// violations are returned as `Err`.
pub async fn polite_disconnect<S, D>(
    mut session: Session<S>,
    devices: &mut DeviceSet<D>,
    reject_delay: Duration,
) -> Result<DisconnectOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Device,
{
    let mut phase = DisconnectPhase::Idle;
    let mut extra_cycles = 0;

    loop {
        phase.send_request()?;
        info!("sending PoliteDisconnect request to DGI");

        let reply = match session.exchange(Message::PoliteDisconnect.encode()).await {
            Ok(reply) => reply,
            Err(e) if e.is_transport() => {
                return Ok(close_impolitely(session, e, extra_cycles).await);
            }
            Err(e) => return Err(e),
        };

        let response = match Message::parse(&reply)? {
            Message::DisconnectAck(response) => response,
            Message::BadRequest(text) => return Err(ProtocolError::BadRequest(text)),
            // The DGI may still answer after reporting an error, so the rest
            // of the message is read as the acknowledgment.
            Message::Error(text) => {
                warn!("received an error from DGI: {text}");
                DisconnectResponse::from_tokens(&text)?
            }
            other => {
                return Err(ProtocolError::MalformedMessage(format!(
                    "got bad disconnect response: {}",
                    other.kind()
                )));
            }
        };
        phase.resolve(response)?;

        match response {
            DisconnectResponse::Accepted => {
                info!(extra_cycles, "PoliteDisconnect accepted by DGI");
                if let Err(e) = session.close().await {
                    warn!("error while closing accepted session: {e}");
                }
                return Ok(DisconnectOutcome::Accepted { extra_cycles });
            }
            DisconnectResponse::Rejected => {
                info!("PoliteDisconnect rejected, performing another round of work");
                match run_cycle(&mut session, devices, reject_delay).await {
                    Ok(()) => extra_cycles += 1,
                    Err(e) if e.is_transport() => {
                        return Ok(close_impolitely(session, e, extra_cycles).await);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

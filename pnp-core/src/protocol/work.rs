//! The steady-state work cycle: report states, apply commands, idle.
//!
//! Nothing here reconnects. Transport failures propagate to the caller,
//! which owns the session teardown and reconnection policy.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::device::{Device, DeviceSet};
use crate::error::{ProtocolError, Result};
use crate::message::{Message, SignalEntry};
use crate::network::Session;

/// Text the DGI puts in an `Error` when it dropped the session for
/// inactivity.
pub const TIMEOUT_INDICATOR: &str = "Connection closed due to timeout";

/// Snapshot every signal of every device.
///
/// Devices appear in registration order, signals sorted by name.
pub fn collect_states<D: Device>(devices: &DeviceSet<D>) -> Result<Vec<SignalEntry>> {
    let mut entries = Vec::new();
    for device in devices.iter() {
        let mut signals = device.signals();
        signals.sort_unstable();
        for signal in signals {
            let value = device
                .signal_value(signal)
                .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;
            entries.push(SignalEntry::new(device.name(), signal, value));
        }
    }
    Ok(entries)
}

/// Send the current state of every device to the DGI.
pub async fn report_state<S, D>(session: &mut Session<S>, devices: &DeviceSet<D>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Device,
{
    let states = collect_states(devices)?;
    debug!(signals = states.len(), "sending states to DGI");
    session
        .send_message(&Message::DeviceStates(states))
        .await?;
    debug!("sent states to DGI");
    Ok(())
}

/// Receive one command set and apply it to the devices.
///
/// The whole set is validated against the device set before any command
/// is applied. Returns the number of commands applied.
pub async fn apply_commands<S, D>(
    session: &mut Session<S>,
    devices: &mut DeviceSet<D>,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Device,
{
    debug!("awaiting commands from DGI");
    let commands = match session.recv_message().await? {
        Message::DeviceCommands(commands) => commands,
        Message::BadRequest(text) => return Err(ProtocolError::BadRequest(text)),
        Message::Error(text) if text.contains(TIMEOUT_INDICATOR) => {
            return Err(ProtocolError::ConnectionLost(format!(
                "DGI reported timeout: {text}"
            )));
        }
        Message::Error(text) => return Err(ProtocolError::PeerError(text)),
        other => {
            return Err(ProtocolError::MalformedMessage(format!(
                "malformed command packet: expected DeviceCommands, got {}",
                other.kind()
            )));
        }
    };

    for command in &commands {
        let device = devices.get(&command.device).ok_or_else(|| {
            ProtocolError::MalformedMessage(format!(
                "packet references unknown device {}",
                command.device
            ))
        })?;
        if !device.has_signal(&command.signal) {
            return Err(ProtocolError::MalformedMessage(format!(
                "packet contains invalid signal: {} {}",
                command.device, command.signal
            )));
        }
    }

    for command in &commands {
        let Some(device) = devices.get_mut(&command.device) else {
            return Err(ProtocolError::MalformedMessage(format!(
                "packet references unknown device {}",
                command.device
            )));
        };
        device
            .command_signal(&command.signal, command.value)
            .map_err(|e| {
                ProtocolError::MalformedMessage(format!("packet contains invalid signal: {e}"))
            })?;
    }

    info!(commands = commands.len(), "device states have been updated");
    Ok(commands.len())
}

/// One full work cycle: report, apply, then idle for `delay`.
pub async fn run_cycle<S, D>(
    session: &mut Session<S>,
    devices: &mut DeviceSet<D>,
    delay: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Device,
{
    report_state(session, devices).await?;
    apply_commands(session, devices).await?;
    tokio::time::sleep(delay).await;
    Ok(())
}

//! Registration with the DGI adapter factory.
//!
//! ```text
//!  connect ──fail──► wait ──┐
//!     │ ▲                   │
//!     │ └───────────────────┘
//!     ▼
//!  Hello ──transport error──► close, wait, reconnect
//!     │
//!     ├── Error       ──► wait, start over with a fresh socket
//!     ├── BadRequest  ──► fatal
//!     ├── other       ──► fatal
//!     └── Start       ──► Session
//! ```

use tracing::{info, warn};

use crate::device::{Device, DeviceSet};
use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::network::{Connector, Session};
use crate::protocol::ProtocolConfig;

/// Build the Hello announcing every device the controller owns.
pub fn hello_for<D: Device>(name: &str, devices: &DeviceSet<D>) -> Message {
    Message::hello(name, devices.iter().map(|d| (d.device_type(), d.name())))
}

/// Register with the DGI and return the established session.
///
/// Connection failures and peer-reported errors are retried forever with
/// `config.hello_delay` between attempts; this only returns an error for
/// conditions no retry can fix.
pub async fn connect<C, D>(
    connector: &C,
    devices: &DeviceSet<D>,
    config: &ProtocolConfig,
) -> Result<Session<C::Stream>>
where
    C: Connector,
    D: Device,
{
    let hello = hello_for(&config.name, devices).encode();
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;
        info!(attempt, "attempting to connect to adapter factory");

        let stream = match connector.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(attempt, "fail connecting to adapter factory: {e}");
                tokio::time::sleep(config.hello_delay).await;
                continue;
            }
        };
        info!("connected to adapter factory");

        let mut session = Session::new(stream, config.io_timeout);
        let reply = match session.exchange(hello.clone()).await {
            Ok(reply) => reply,
            Err(e) if e.is_transport() => {
                warn!(attempt, "adapter factory communication failure: {e}");
                session.abort().await;
                tokio::time::sleep(config.hello_delay).await;
                continue;
            }
            Err(e) => return Err(e),
        };

        match Message::parse(&reply)? {
            Message::Start => {
                info!(devices = devices.len(), "received Start, session established");
                return Ok(session);
            }
            Message::Error(text) => {
                warn!(attempt, "received an error from DGI: {text}");
                session.abort().await;
                tokio::time::sleep(config.hello_delay).await;
            }
            Message::BadRequest(text) => return Err(ProtocolError::BadRequest(text)),
            other => {
                return Err(ProtocolError::MalformedMessage(format!(
                    "DGI sent malformed Start: got {}",
                    other.kind()
                )));
            }
        }
    }
}

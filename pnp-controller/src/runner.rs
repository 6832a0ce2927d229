//! Drives the protocol engine from a DSP script.
//!
//! The controller holds at most one session. Device set changes always
//! go through a polite disconnect and a fresh handshake, because the DGI
//! only learns about devices from the Hello.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use pnp_core::{
    Connector, DeviceError, DeviceSet, Message, ProtocolConfig, ProtocolError, Session,
    TcpConnector, connect, polite_disconnect, run_cycle, send_to_factory,
};
use tracing::{error, info, warn};

use crate::config::ControllerConfig;
use crate::device::SimDevice;
use crate::error::ControllerError;
use crate::script::{Script, Step, WorkAmount};

pub type Result<T> = std::result::Result<T, ControllerError>;

pub struct Controller<C: Connector> {
    connector: C,
    protocol: ProtocolConfig,
    /// Idle time after a hand-written packet.
    custom_delay: Duration,
    /// Protection window handed to every enabled device.
    protect_for: Duration,
    devices: DeviceSet<SimDevice>,
    session: Option<Session<C::Stream>>,
}

impl Controller<TcpConnector> {
    pub fn from_config(config: &ControllerConfig) -> Self {
        let protocol = config.to_protocol_config();
        let connector = TcpConnector::new(config.connection_info(), protocol.io_timeout);
        info!("DGI adapter factory: {}", connector.info());
        Self::new(
            connector,
            protocol,
            config.custom_delay(),
            config.protected_state_duration(),
        )
    }
}

impl<C: Connector> Controller<C> {
    pub fn new(
        connector: C,
        protocol: ProtocolConfig,
        custom_delay: Duration,
        protect_for: Duration,
    ) -> Self {
        Self {
            connector,
            protocol,
            custom_delay,
            protect_for,
            devices: DeviceSet::new(),
            session: None,
        }
    }

    pub fn devices(&self) -> &DeviceSet<SimDevice> {
        &self.devices
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Run every step of the script, then leave the DGI politely.
    pub async fn run(&mut self, script: &Script) -> Result<()> {
        for line in script.lines() {
            info!(line = line.line, "processing command: {}", line.step);
            self.execute(&line.step).await?;
        }
        info!("that seems to be the end of my script, disconnecting now");
        self.disconnect().await
    }

    pub async fn execute(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Enable {
                device_type,
                name,
                signals,
            } => {
                let device = SimDevice::new(
                    device_type.as_str(),
                    name.as_str(),
                    signals.iter().cloned(),
                    self.protect_for,
                );
                self.devices.insert(device)?;
                info!(device = %name, "enabled device");
                self.disconnect().await?;
                self.reconnect().await
            }
            Step::Disable { name } => {
                self.require_session("disable devices")?;
                self.devices.remove(name)?;
                info!(device = %name, "disabled device");
                self.disconnect().await?;
                self.reconnect().await
            }
            Step::Change {
                name,
                signal,
                value,
            } => {
                self.require_session("change a signal")?;
                let device = self
                    .devices
                    .get_mut(name)
                    .ok_or_else(|| DeviceError::NoSuchDevice(name.clone()))?;
                device.set_signal(signal, *value)?;
                info!(device = %name, signal = %signal, value, "changed signal");
                Ok(())
            }
            Step::Work(amount) => self.work(*amount).await,
            Step::Sleep(duration) => {
                info!("going to sleep for {} seconds", duration.as_secs());
                tokio::time::sleep(*duration).await;
                Ok(())
            }
            Step::SendToFactory(path) => self.send_to_factory(path).await,
            Step::SendToAdapter(path) => self.send_to_adapter(path).await,
            Step::DieHorribly => {
                error!("I have died horribly, goodbye");
                // Dropped without a disconnect or even a shutdown.
                self.session = None;
                Err(ControllerError::DiedHorribly)
            }
        }
    }

    // ── Session management ───────────────────────────────────────

    fn require_session(&self, what: &'static str) -> Result<()> {
        if self.session.is_none() {
            return Err(ControllerError::NotConnected(what));
        }
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        let session = connect(&self.connector, &self.devices, &self.protocol).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Leave the DGI politely if a session is open.
    async fn disconnect(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let outcome =
            polite_disconnect(session, &mut self.devices, self.protocol.reject_delay).await?;
        if outcome.is_polite() {
            info!(extra_cycles = outcome.extra_cycles(), "disconnected from DGI");
        } else {
            warn!(
                extra_cycles = outcome.extra_cycles(),
                "lost the DGI while disconnecting"
            );
        }
        Ok(())
    }

    async fn drop_and_reconnect(&mut self, cause: ProtocolError) -> Result<()> {
        warn!("DGI communication error: {cause}");
        warn!("performing impolite reconnect");
        if let Some(session) = self.session.take() {
            session.abort().await;
        }
        self.reconnect().await
    }

    // ── Work ─────────────────────────────────────────────────────

    async fn work(&mut self, amount: WorkAmount) -> Result<()> {
        self.require_session("work")?;
        match amount {
            WorkAmount::Cycles(n) => {
                for i in 0..n {
                    info!("performing work {} of {n}", i + 1);
                    self.work_once().await?;
                }
                Ok(())
            }
            WorkAmount::Forever => {
                let mut i: u64 = 0;
                loop {
                    info!("working forever, as ordered captain: {i}");
                    self.work_once().await?;
                    i += 1;
                }
            }
        }
    }

    /// One work cycle. A transport failure costs the session, not the run.
    async fn work_once(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(ControllerError::NotConnected("work"));
        };
        match run_cycle(session, &mut self.devices, self.protocol.work_delay).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transport() => self.drop_and_reconnect(e).await,
            Err(e) => Err(e.into()),
        }
    }

    // ── Hand-written packets ─────────────────────────────────────

    async fn send_to_factory(&mut self, path: &Path) -> Result<()> {
        let packet = read_packet(path).await?;
        info!("going to send to adapter factory:\n{}", printable(&packet));

        match send_to_factory(&self.connector, packet, self.protocol.io_timeout).await {
            Ok(reply) => check_reply("factory", &reply)?,
            Err(e) if e.is_transport() => warn!("sendtofactory failed: {e}"),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(self.custom_delay).await;
        Ok(())
    }

    async fn send_to_adapter(&mut self, path: &Path) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(ControllerError::NotConnected("sendtoadapter"));
        };
        let packet = read_packet(path).await?;
        info!("going to send to adapter:\n{}", printable(&packet));

        // A broken session is left for the next work cycle to notice.
        match session.exchange(packet).await {
            Ok(reply) => check_reply("adapter", &reply)?,
            Err(e) if e.is_transport() => warn!("sendtoadapter failed: {e}"),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(self.custom_delay).await;
        Ok(())
    }
}

async fn read_packet(path: &Path) -> Result<Bytes> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| ControllerError::read(path, e))
}

fn printable(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\r', "")
}

/// A `BadRequest` reply to a hand-written packet ends the run; anything
/// else is only shown.
fn check_reply(peer: &str, reply: &[u8]) -> Result<()> {
    if reply.starts_with(b"BadRequest") {
        let text = match Message::parse(reply) {
            Ok(Message::BadRequest(text)) => text,
            _ => printable(reply),
        };
        return Err(ProtocolError::BadRequest(text).into());
    }
    info!("{peer} responded:\n{}", printable(reply));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pnp_core::Device;
    use tokio_test::io::{Builder, Mock};

    use super::*;

    const HELLO_T1: &[u8] = b"Hello\r\nctrl\r\nthermostat T1\r\n\r\n";
    const START: &[u8] = b"Start\r\n\r\n";
    const STATES_T1: &[u8] = b"DeviceStates\r\nT1 temp 21.5\r\n\r\n";
    const BYE: &[u8] = b"PoliteDisconnect\r\n\r\n";
    const ACCEPTED: &[u8] = b"PoliteDisconnect Accepted\r\n\r\n";

    struct ScriptedConnector {
        attempts: Mutex<VecDeque<io::Result<Mock>>>,
    }

    impl ScriptedConnector {
        fn new(attempts: Vec<io::Result<Mock>>) -> Self {
            Self {
                attempts: Mutex::new(attempts.into()),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Stream = Mock;

        async fn connect(&self) -> io::Result<Mock> {
            self.attempts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()))
        }
    }

    fn controller(attempts: Vec<io::Result<Mock>>) -> Controller<ScriptedConnector> {
        let protocol = ProtocolConfig {
            io_timeout: Duration::from_secs(5),
            hello_delay: Duration::from_secs(5),
            work_delay: Duration::from_secs(1),
            reject_delay: Duration::from_secs(1),
            ..ProtocolConfig::new("ctrl")
        };
        Controller::new(
            ScriptedConnector::new(attempts),
            protocol,
            Duration::from_secs(2),
            Duration::from_secs(3),
        )
    }

    fn script(text: &str) -> Script {
        Script::parse(text).unwrap()
    }

    fn packet_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pnp-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test(start_paused = true)]
    async fn enable_then_end_of_script() {
        let dgi = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .write(BYE)
            .read(ACCEPTED)
            .build();
        let mut ctrl = controller(vec![Ok(dgi)]);

        ctrl.run(&script("enable thermostat T1 temp 21.5"))
            .await
            .unwrap();
        assert!(!ctrl.is_connected());
        assert_eq!(ctrl.devices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_enable_reconnects_with_both_devices() {
        let first = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .write(BYE)
            .read(ACCEPTED)
            .build();
        let second = Builder::new()
            .write(b"Hello\r\nctrl\r\nthermostat T1\r\nSst SST1\r\n\r\n")
            .read(START)
            .build();
        let mut ctrl = controller(vec![Ok(first), Ok(second)]);

        ctrl.execute(&"enable thermostat T1 temp 21.5".parse().unwrap())
            .await
            .unwrap();
        ctrl.execute(&"enable Sst SST1 gateway 0".parse().unwrap())
            .await
            .unwrap();
        assert!(ctrl.is_connected());
        assert_eq!(ctrl.devices().len(), 2);
    }

    #[tokio::test]
    async fn commands_before_first_hello_are_fatal() {
        let mut ctrl = controller(Vec::new());
        for line in ["disable T1", "change T1 temp 3", "work 1", "sendtoadapter x"] {
            let err = ctrl.execute(&line.parse().unwrap()).await.unwrap_err();
            assert!(matches!(err, ControllerError::NotConnected(_)), "{line}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn work_reconnects_after_transport_failure() {
        let first = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .write(STATES_T1)
            .read(b"DeviceCommands\r\nT1 temp 22\r\n\r\n")
            .write(b"DeviceStates\r\nT1 temp 22\r\n\r\n")
            .read(b"Error\r\nConnection closed due to timeout\r\n\r\n")
            .build();
        let second = Builder::new()
            .write(b"Hello\r\nctrl\r\nthermostat T1\r\n\r\n")
            .read(START)
            .write(b"DeviceStates\r\nT1 temp 22\r\n\r\n")
            .read(b"DeviceCommands\r\nT1 temp 23\r\n\r\n")
            .write(BYE)
            .read(ACCEPTED)
            .build();
        let mut ctrl = controller(vec![Ok(first), Ok(second)]);

        ctrl.run(&script("enable thermostat T1 temp 21.5\nwork 3"))
            .await
            .unwrap();
        let t1 = ctrl.devices().get("T1").unwrap();
        assert_eq!(t1.signal_value("temp").unwrap(), 23.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_reconnects_after_one_timeout() {
        let stalled = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .wait(Duration::from_secs(60))
            .build();
        let fresh = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .write(STATES_T1)
            .read(b"DeviceCommands\r\n\r\n")
            .build();
        let mut ctrl = controller(vec![Ok(stalled), Ok(fresh)]);
        ctrl.execute(&"enable thermostat T1 temp 21.5".parse().unwrap())
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        ctrl.execute(&Step::Work(WorkAmount::Cycles(2)))
            .await
            .unwrap();
        // One io timeout on the stalled socket plus one work delay.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert!(ctrl.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn change_protects_signal_from_next_command() {
        let dgi = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .write(b"DeviceStates\r\nT1 temp 30\r\n\r\n")
            .read(b"DeviceCommands\r\nT1 temp 22\r\n\r\n")
            .build();
        let mut ctrl = controller(vec![Ok(dgi)]);

        for line in ["enable thermostat T1 temp 21.5", "change T1 temp 30", "work 1"] {
            ctrl.execute(&line.parse().unwrap()).await.unwrap();
        }
        let t1 = ctrl.devices().get("T1").unwrap();
        assert_eq!(t1.signal_value("temp").unwrap(), 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_renegotiates_without_the_device() {
        let hello_both: &[u8] = b"Hello\r\nctrl\r\nthermostat T1\r\nSst SST1\r\n\r\n";
        let first = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .write(BYE)
            .read(ACCEPTED)
            .build();
        let second = Builder::new()
            .write(hello_both)
            .read(START)
            .write(BYE)
            .read(ACCEPTED)
            .build();
        let third = Builder::new()
            .write(b"Hello\r\nctrl\r\nSst SST1\r\n\r\n")
            .read(START)
            .build();
        let mut ctrl = controller(vec![Ok(first), Ok(second), Ok(third)]);

        for line in [
            "enable thermostat T1 temp 21.5",
            "enable Sst SST1 gateway 0",
            "disable T1",
        ] {
            ctrl.execute(&line.parse().unwrap()).await.unwrap();
        }
        assert!(ctrl.is_connected());
        assert!(!ctrl.devices().contains("T1"));

        let err = ctrl
            .execute(&"disable T1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Device(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn bad_request_from_factory_is_fatal() {
        let path = packet_file("dup-hello", b"Hello\r\nx\r\nSst A\r\nSst A\r\n\r\n");
        let factory = Builder::new()
            .write(b"Hello\r\nx\r\nSst A\r\nSst A\r\n\r\n")
            .read(b"BadRequest\r\nDuplicate device: A\r\n\r\n")
            .build();
        let mut ctrl = controller(vec![Ok(factory)]);

        let err = ctrl
            .execute(&Step::SendToFactory(path.clone()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Protocol(ProtocolError::BadRequest(ref t)) if t.contains("Duplicate")
        ));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_factory_is_only_logged() {
        let path = packet_file("start", b"Start\r\n\r\n");
        let mut ctrl = controller(Vec::new());

        let started = tokio::time::Instant::now();
        ctrl.execute(&Step::SendToFactory(path.clone()))
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_adapter_uses_the_session() {
        let path = packet_file("states", b"DeviceStates\r\nT1 temp 99\r\n\r\n");
        let dgi = Builder::new()
            .write(HELLO_T1)
            .read(START)
            .write(b"DeviceStates\r\nT1 temp 99\r\n\r\n")
            .read(b"DeviceCommands\r\n\r\n")
            .build();
        let mut ctrl = controller(vec![Ok(dgi)]);

        ctrl.execute(&"enable thermostat T1 temp 21.5".parse().unwrap())
            .await
            .unwrap();
        ctrl.execute(&Step::SendToAdapter(path.clone()))
            .await
            .unwrap();
        assert!(ctrl.is_connected());
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn die_horribly_abandons_the_session() {
        let dgi = Builder::new().write(HELLO_T1).read(START).build();
        let mut ctrl = controller(vec![Ok(dgi)]);

        let err = ctrl
            .run(&script("enable thermostat T1 temp 21.5\ndieHorribly\nwork 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::DiedHorribly));
        assert!(!ctrl.is_connected());
    }

    #[test]
    fn check_reply_only_fails_on_bad_request() {
        assert!(check_reply("factory", b"Start\r\n\r\n").is_ok());
        assert!(check_reply("factory", b"Error\r\nnope\r\n\r\n").is_ok());
        assert!(check_reply("factory", b"BadRequest\r\n\r\n").is_err());
    }
}

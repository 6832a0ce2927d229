//! A simulated device that obeys the DGI instantly, except when it doesn't.
//!
//! Two kinds of command are ignored:
//! - the null command ([`NULL_COMMAND`]), which the DGI sends while it does
//!   not yet know the device state;
//! - any command on a signal the script changed recently. The DGI may still
//!   be acting on the old value, so the signal is locked for a while.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use pnp_core::{Device, DeviceError};
use tokio::time::Instant;
use tracing::info;

/// Command value meaning "no command for this signal".
pub const NULL_COMMAND: f64 = 1e8;

#[derive(Debug, Clone)]
pub struct SimDevice {
    name: String,
    device_type: String,
    signals: BTreeMap<String, f64>,
    protect_for: Duration,
    /// Expiry of every outstanding lock, per signal.
    locks: HashMap<String, Vec<Instant>>,
}

impl SimDevice {
    pub fn new(
        device_type: impl Into<String>,
        name: impl Into<String>,
        signals: impl IntoIterator<Item = (String, f64)>,
        protect_for: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            device_type: device_type.into(),
            signals: signals.into_iter().collect(),
            protect_for,
            locks: HashMap::new(),
        }
    }

    /// Change a signal locally and shield it from DGI commands for the
    /// protection window. Locks stack: each call adds one that expires on
    /// its own.
    pub fn set_signal(&mut self, signal: &str, value: f64) -> Result<(), DeviceError> {
        let slot = self
            .signals
            .get_mut(signal)
            .ok_or_else(|| DeviceError::NoSuchSignal {
                device: self.name.clone(),
                signal: signal.into(),
            })?;
        *slot = value;
        self.locks
            .entry(signal.to_string())
            .or_default()
            .push(Instant::now() + self.protect_for);
        Ok(())
    }

    /// Number of locks currently held on a signal.
    pub fn lock_count(&mut self, signal: &str) -> usize {
        let now = Instant::now();
        let Some(deadlines) = self.locks.get_mut(signal) else {
            return 0;
        };
        deadlines.retain(|deadline| *deadline > now);
        let count = deadlines.len();
        if count == 0 {
            self.locks.remove(signal);
        }
        count
    }
}

impl Device for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn signals(&self) -> Vec<&str> {
        self.signals.keys().map(String::as_str).collect()
    }

    fn signal_value(&self, signal: &str) -> Result<f64, DeviceError> {
        self.signals
            .get(signal)
            .copied()
            .ok_or_else(|| DeviceError::NoSuchSignal {
                device: self.name.clone(),
                signal: signal.into(),
            })
    }

    fn command_signal(&mut self, signal: &str, value: f64) -> Result<(), DeviceError> {
        if !self.signals.contains_key(signal) {
            return Err(DeviceError::NoSuchSignal {
                device: self.name.clone(),
                signal: signal.into(),
            });
        }

        let locks = self.lock_count(signal);
        if locks > 0 {
            info!(device = %self.name, signal, locks, "not updating: signal is protected");
            return Ok(());
        }
        if value == NULL_COMMAND {
            info!(device = %self.name, signal, "not updating: received null command");
            return Ok(());
        }

        if let Some(slot) = self.signals.get_mut(signal) {
            *slot = value;
        }
        Ok(())
    }

    fn has_signal(&self, signal: &str) -> bool {
        self.signals.contains_key(signal)
    }
}

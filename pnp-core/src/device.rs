//! The narrow device interface consumed by the protocol, and the
//! name-keyed collection the controller keeps its devices in.

use std::collections::HashMap;

use crate::error::DeviceError;

/// A physical (or simulated) device attached to the controller.
pub trait Device {
    /// Unique name of the device within its controller.
    fn name(&self) -> &str;

    /// Type tag announced in the Hello message.
    fn device_type(&self) -> &str;

    /// Names of every signal the device exposes. Order is irrelevant.
    fn signals(&self) -> Vec<&str>;

    /// Current value of a signal.
    fn signal_value(&self, signal: &str) -> Result<f64, DeviceError>;

    /// Apply a command from the peer to a signal.
    fn command_signal(&mut self, signal: &str, value: f64) -> Result<(), DeviceError>;

    fn has_signal(&self, signal: &str) -> bool {
        self.signals().contains(&signal)
    }
}

/// Devices attached to a controller, kept in registration order and
/// indexed by name.
#[derive(Debug)]
pub struct DeviceSet<D> {
    devices: Vec<D>,
    index: HashMap<String, usize>,
}

impl<D: Device> DeviceSet<D> {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a device. Names must be unique.
    pub fn insert(&mut self, device: D) -> Result<(), DeviceError> {
        let name = device.name().to_string();
        if self.index.contains_key(&name) {
            return Err(DeviceError::DuplicateDevice(name));
        }
        self.index.insert(name, self.devices.len());
        self.devices.push(device);
        Ok(())
    }

    /// Remove a device by name and hand it back.
    pub fn remove(&mut self, name: &str) -> Result<D, DeviceError> {
        let idx = self
            .index
            .remove(name)
            .ok_or_else(|| DeviceError::NoSuchDevice(name.to_string()))?;
        let device = self.devices.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Ok(device)
    }

    pub fn get(&self, name: &str) -> Option<&D> {
        self.index.get(name).map(|&idx| &self.devices[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut D> {
        self.index.get(name).map(|&idx| &mut self.devices[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<D: Device> Default for DeviceSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

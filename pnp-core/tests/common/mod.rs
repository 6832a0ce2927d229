//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use pnp_core::{Device, DeviceError, DeviceSet};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

// ── Devices ──────────────────────────────────────────────────────

/// A device that stores whatever it is told and counts commands.
#[derive(Debug, Clone)]
pub struct TestDevice {
    pub name: String,
    pub device_type: String,
    pub signals: BTreeMap<String, f64>,
    pub commands: Vec<(String, f64)>,
}

impl TestDevice {
    pub fn new(device_type: &str, name: &str, signals: &[(&str, f64)]) -> Self {
        Self {
            name: name.into(),
            device_type: device_type.into(),
            signals: signals.iter().map(|(s, v)| (s.to_string(), *v)).collect(),
            commands: Vec::new(),
        }
    }
}

impl Device for TestDevice {
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
        match self.signals.get_mut(signal) {
            Some(slot) => {
                *slot = value;
                self.commands.push((signal.into(), value));
                Ok(())
            }
            None => Err(DeviceError::NoSuchSignal {
                device: self.name.clone(),
                signal: signal.into(),
            }),
        }
    }
}

/// The single-thermostat controller used throughout the examples.
pub fn thermostat() -> DeviceSet<TestDevice> {
    let mut set = DeviceSet::new();
    set.insert(TestDevice::new("thermostat", "T1", &[("temp", 21.5)]))
        .unwrap();
    set
}

// ── ScriptedStream ───────────────────────────────────────────────

/// In-memory stream with scripted reads and a throttled write side.
///
/// Reads hand out one scripted chunk per call, then EOF. Writes accept at
/// most `max_write` bytes per call and, once `write_budget` bytes have
/// been accepted, accept nothing at all.
pub struct ScriptedStream {
    reads: VecDeque<Vec<u8>>,
    max_write: usize,
    write_budget: Option<usize>,
    pub written: Arc<Mutex<Vec<u8>>>,
    pub write_calls: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl ScriptedStream {
    pub fn new(reads: &[&[u8]]) -> Self {
        Self {
            reads: reads.iter().map(|r| r.to_vec()).collect(),
            max_write: usize::MAX,
            write_budget: None,
            written: Arc::default(),
            write_calls: Arc::default(),
            shutdowns: Arc::default(),
        }
    }

    pub fn max_write(mut self, max_write: usize) -> Self {
        self.max_write = max_write;
        self
    }

    pub fn write_budget(mut self, budget: usize) -> Self {
        self.write_budget = Some(budget);
        self
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(chunk) = self.reads.front_mut() {
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            chunk.drain(..n);
            if chunk.is_empty() {
                self.reads.pop_front();
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut n = buf.len().min(self.max_write);
        if let Some(budget) = self.write_budget.as_mut() {
            n = n.min(*budget);
            *budget -= n;
        }
        self.written.lock().unwrap().extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

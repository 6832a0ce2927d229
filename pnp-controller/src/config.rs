//! Configuration for the fake controller.
//!
//! All timings are in milliseconds, matching the keys of the classic
//! `controller.cfg`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pnp_core::{ConnectionInfo, ProtocolConfig};
use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Identity and behaviour script.
    pub controller: ControllerSection,
    /// Where the DGI adapter factory listens.
    pub connection: ConnectionConfig,
    /// Protocol delays and timeouts.
    pub timings: TimingsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Controller identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// Unique name announced in every Hello.
    pub name: String,
    /// DSP script to run.
    pub script: PathBuf,
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Hostname of the DGI.
    pub host: String,
    /// Listening port of the DGI adapter factory.
    pub port: u16,
}

/// Protocol timings, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TimingsConfig {
    /// Idle time after each work cycle.
    pub state_timeout: u64,
    /// Wait between handshake attempts.
    pub hello_timeout: u64,
    /// Bound on every socket operation.
    pub dgi_timeout: u64,
    /// Idle time after a hand-written packet was sent.
    pub custom_timeout: u64,
    /// How long a locally changed signal ignores DGI commands.
    pub protected_state_duration: u64,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller: ControllerSection::default(),
            connection: ConnectionConfig::default(),
            timings: TimingsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            name: "fake-controller".into(),
            script: PathBuf::from("config/dsp-script.txt"),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 53000,
        }
    }
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            state_timeout: 1000,
            hello_timeout: 5000,
            dgi_timeout: 10000,
            custom_timeout: 2000,
            protected_state_duration: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Overrides ────────────────────────────────────────────────────

/// Values given on the command line, which win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub name: Option<String>,
    pub port: Option<u16>,
    pub script: Option<PathBuf>,
}

// ── Loading ──────────────────────────────────────────────────────

impl ControllerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Unlike most services a controller cannot guess its peer, so a
    /// missing or invalid file is an error.
    pub fn load(path: &Path) -> Result<Self, ControllerError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ControllerError::read(path, e))?;
        Self::parse(&contents).map_err(|source| ControllerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.connection.host = host;
        }
        if let Some(name) = overrides.name {
            self.controller.name = name;
        }
        if let Some(port) = overrides.port {
            self.connection.port = port;
        }
        if let Some(script) = overrides.script {
            self.controller.script = script;
        }
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::new(self.connection.host.clone(), self.connection.port)
    }

    /// Convert timings into the protocol engine's settings.
    ///
    /// The extra work cycle after a rejected disconnect idles for the
    /// regular state timeout.
    pub fn to_protocol_config(&self) -> ProtocolConfig {
        let t = &self.timings;
        ProtocolConfig {
            name: self.controller.name.clone(),
            io_timeout: Duration::from_millis(t.dgi_timeout.max(1)),
            hello_delay: Duration::from_millis(t.hello_timeout),
            work_delay: Duration::from_millis(t.state_timeout),
            reject_delay: Duration::from_millis(t.state_timeout),
        }
    }

    pub fn custom_delay(&self) -> Duration {
        Duration::from_millis(self.timings.custom_timeout)
    }

    pub fn protected_state_duration(&self) -> Duration {
        Duration::from_millis(self.timings.protected_state_duration)
    }
}

// ── Tests ────────────────────────────────────────────────────────

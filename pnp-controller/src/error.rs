//! Errors that end a controller run.

use std::path::PathBuf;

use pnp_core::{DeviceError, ProtocolError};
use thiserror::Error;

use crate::script::ScriptError;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A script command that needs a live session ran before the first
    /// successful handshake.
    #[error("can't {0} before first Hello")]
    NotConnected(&'static str),

    #[error("cannot start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("controller died horribly")]
    DiedHorribly,
}

impl ControllerError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

//! # pnp-controller
//!
//! A fake device controller that registers simulated devices with a DGI
//! and follows a DSP script instead of real power electronics.
//!
//! - **config**: TOML configuration and command-line overrides
//! - **device**: `SimDevice`, with null commands and protected signals
//! - **script**: the DSP script language
//! - **runner**: `Controller`, which executes a script over the protocol

pub mod config;
pub mod device;
pub mod error;
pub mod runner;
pub mod script;

pub use config::{ControllerConfig, Overrides};
pub use device::SimDevice;
pub use error::ControllerError;
pub use runner::Controller;
pub use script::{Script, ScriptError, Step};

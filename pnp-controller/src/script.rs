//! DSP simulation scripts.
//!
//! A script is a list of commands, one per line, that stands in for the
//! power electronics the controller would normally drive:
//!
//! ```text
//! # comment
//! enable <type> <name> <signal> <value> [<signal> <value> ...]
//! disable <name>
//! change <name> <signal> <value>
//! work <cycles>|forever
//! sleep <seconds>
//! sendtofactory <packet-file>
//! sendtoadapter <packet-file>
//! dieHorribly
//! ```
//!
//! The whole script is parsed up front, so a typo on the last line is
//! reported before the controller ever connects.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::error::ControllerError;

/// A script line that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid script command on line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

/// How long a `work` command keeps the work cycle going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkAmount {
    Cycles(u64),
    Forever,
}

/// One parsed script command.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Enable {
        device_type: String,
        name: String,
        signals: Vec<(String, f64)>,
    },
    Disable {
        name: String,
    },
    Change {
        name: String,
        signal: String,
        value: f64,
    },
    Work(WorkAmount),
    Sleep(Duration),
    SendToFactory(PathBuf),
    SendToAdapter(PathBuf),
    DieHorribly,
}

impl Step {
    /// The script keyword that introduces this step.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Enable { .. } => "enable",
            Self::Disable { .. } => "disable",
            Self::Change { .. } => "change",
            Self::Work(_) => "work",
            Self::Sleep(_) => "sleep",
            Self::SendToFactory(_) => "sendtofactory",
            Self::SendToAdapter(_) => "sendtoadapter",
            Self::DieHorribly => "dieHorribly",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())?;
        match self {
            Self::Enable {
                device_type,
                name,
                signals,
            } => {
                write!(f, " {device_type} {name}")?;
                for (signal, value) in signals {
                    write!(f, " {signal} {value}")?;
                }
                Ok(())
            }
            Self::Disable { name } => write!(f, " {name}"),
            Self::Change {
                name,
                signal,
                value,
            } => write!(f, " {name} {signal} {value}"),
            Self::Work(WorkAmount::Cycles(n)) => write!(f, " {n}"),
            Self::Work(WorkAmount::Forever) => f.write_str(" forever"),
            Self::Sleep(duration) => write!(f, " {}", duration.as_secs()),
            Self::SendToFactory(path) | Self::SendToAdapter(path) => {
                write!(f, " {}", path.display())
            }
            Self::DieHorribly => Ok(()),
        }
    }
}

fn parse_value(token: &str) -> Result<f64, String> {
    match token.parse::<f64>() {
        Ok(value) if value.is_nan() => Err(format!("signal value {token} is not a number")),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("signal value {token} is not a number")),
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["enable", device_type, name, pairs @ ..] => {
                if pairs.is_empty() || pairs.len() % 2 != 0 {
                    return Err("enable needs a type, a name and signal/value pairs".into());
                }
                let mut signals: Vec<(String, f64)> = Vec::with_capacity(pairs.len() / 2);
                for pair in pairs.chunks_exact(2) {
                    if signals.iter().any(|(s, _)| s == pair[0]) {
                        return Err(format!("signal {} listed twice", pair[0]));
                    }
                    signals.push((pair[0].to_string(), parse_value(pair[1])?));
                }
                Ok(Self::Enable {
                    device_type: device_type.to_string(),
                    name: name.to_string(),
                    signals,
                })
            }
            ["disable", name] => Ok(Self::Disable {
                name: name.to_string(),
            }),
            ["change", name, signal, value] => Ok(Self::Change {
                name: name.to_string(),
                signal: signal.to_string(),
                value: parse_value(value)?,
            }),
            ["work", "forever"] => Ok(Self::Work(WorkAmount::Forever)),
            ["work", n] => match n.parse::<u64>() {
                Ok(0) | Err(_) => Err(format!("nonsense to work for {n} cycles")),
                Ok(n) => Ok(Self::Work(WorkAmount::Cycles(n))),
            },
            ["sleep", secs] => secs
                .parse::<u64>()
                .map(|s| Self::Sleep(Duration::from_secs(s)))
                .map_err(|_| format!("cannot sleep for {secs} seconds")),
            ["sendtofactory", file] => Ok(Self::SendToFactory(PathBuf::from(file))),
            ["sendtoadapter", file] => Ok(Self::SendToAdapter(PathBuf::from(file))),
            ["dieHorribly"] => Ok(Self::DieHorribly),
            _ => Err(format!("unrecognised command: {}", line.trim())),
        }
    }
}

/// A step together with the script line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub step: Step,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    lines: Vec<ScriptLine>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut lines = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let step = trimmed.parse::<Step>().map_err(|message| ScriptError {
                line: idx + 1,
                message,
            })?;
            lines.push(ScriptLine {
                line: idx + 1,
                step,
            });
        }
        Ok(Self { lines })
    }

    pub fn load(path: &Path) -> Result<Self, ControllerError> {
        let text = std::fs::read_to_string(path).map_err(|e| ControllerError::read(path, e))?;
        Ok(Self::parse(&text)?)
    }

    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

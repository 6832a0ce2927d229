//! Protocol message types and their text encoding.
//!
//! Every message is a command line, zero or more data lines and a blank
//! line. Parsing is all-or-nothing: a message that fails validation on any
//! line is rejected as a whole, so a bad command set is never half applied.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::codec::LINE_END;
use crate::error::{ProtocolError, Result};

// ── MessageKind ──────────────────────────────────────────────────

/// The leading token of every protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Start,
    DeviceStates,
    DeviceCommands,
    PoliteDisconnect,
    Error,
    BadRequest,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "Hello",
            Self::Start => "Start",
            Self::DeviceStates => "DeviceStates",
            Self::DeviceCommands => "DeviceCommands",
            Self::PoliteDisconnect => "PoliteDisconnect",
            Self::Error => "Error",
            Self::BadRequest => "BadRequest",
        }
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(token: &str) -> Result<Self> {
        match token {
            "Hello" => Ok(Self::Hello),
            "Start" => Ok(Self::Start),
            "DeviceStates" => Ok(Self::DeviceStates),
            "DeviceCommands" => Ok(Self::DeviceCommands),
            "PoliteDisconnect" => Ok(Self::PoliteDisconnect),
            "Error" => Ok(Self::Error),
            "BadRequest" => Ok(Self::BadRequest),
            other => Err(ProtocolError::MalformedMessage(format!(
                "unknown message kind: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Payload types ────────────────────────────────────────────────

/// One `type name` line of a Hello message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: String,
    pub name: String,
}

/// One `device signal value` line of a state report or command set.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEntry {
    pub device: String,
    pub signal: String,
    pub value: f64,
}

impl SignalEntry {
    pub fn new(device: impl Into<String>, signal: impl Into<String>, value: f64) -> Self {
        Self {
            device: device.into(),
            signal: signal.into(),
            value,
        }
    }
}

/// The peer's answer to a disconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectResponse {
    Accepted,
    Rejected,
}

impl DisconnectResponse {
    /// Parse an acknowledgment from its whitespace-separated tokens.
    ///
    /// Exactly `PoliteDisconnect Accepted` or `PoliteDisconnect Rejected`
    /// is accepted, regardless of how the two tokens are split over lines.
    pub fn from_tokens(text: &str) -> Result<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            ["PoliteDisconnect", "Accepted"] => Ok(Self::Accepted),
            ["PoliteDisconnect", "Rejected"] => Ok(Self::Rejected),
            _ => Err(ProtocolError::MalformedMessage(format!(
                "got bad disconnect response: {}",
                tokens.join(" ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
        }
    }
}

// ── Message ──────────────────────────────────────────────────────

/// A parsed protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Registration: controller name plus the devices it owns.
    Hello {
        controller: String,
        devices: Vec<DeviceInfo>,
    },
    /// Registration accepted.
    Start,
    /// Current value of every signal of every device.
    DeviceStates(Vec<SignalEntry>),
    /// New setpoints from the peer.
    DeviceCommands(Vec<SignalEntry>),
    /// Request to leave the session.
    PoliteDisconnect,
    /// The peer's answer to [`Message::PoliteDisconnect`].
    DisconnectAck(DisconnectResponse),
    /// Free-form diagnostic from the peer.
    Error(String),
    /// The peer rejected our last message.
    BadRequest(String),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Hello { .. } => MessageKind::Hello,
            Self::Start => MessageKind::Start,
            Self::DeviceStates(_) => MessageKind::DeviceStates,
            Self::DeviceCommands(_) => MessageKind::DeviceCommands,
            Self::PoliteDisconnect | Self::DisconnectAck(_) => MessageKind::PoliteDisconnect,
            Self::Error(_) => MessageKind::Error,
            Self::BadRequest(_) => MessageKind::BadRequest,
        }
    }

    /// Serialize to wire text, terminator included.
    pub fn encode(&self) -> Bytes {
        let mut lines: Vec<String> = vec![self.kind().as_str().to_string()];
        match self {
            Self::Hello {
                controller,
                devices,
            } => {
                lines.push(controller.clone());
                lines.extend(
                    devices
                        .iter()
                        .map(|d| format!("{} {}", d.device_type, d.name)),
                );
            }
            Self::Start | Self::PoliteDisconnect => {}
            Self::DeviceStates(entries) | Self::DeviceCommands(entries) => {
                lines.extend(
                    entries
                        .iter()
                        .map(|e| format!("{} {} {}", e.device, e.signal, e.value)),
                );
            }
            Self::DisconnectAck(response) => {
                lines[0] = format!("{} {}", lines[0], response.as_str());
            }
            Self::Error(text) | Self::BadRequest(text) => {
                if !text.is_empty() {
                    lines.push(text.clone());
                }
            }
        }

        let mut out = String::new();
        for line in &lines {
            out.push_str(line);
            out.push_str(LINE_END);
        }
        out.push_str(LINE_END);
        Bytes::from(out)
    }

    /// Parse one complete frame as produced by the codec.
    ///
    /// The trailing terminator is optional so that hand-written packets can
    /// be parsed too.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(frame).map_err(|e| {
            ProtocolError::MalformedMessage(format!("message is not valid utf-8: {e}"))
        })?;
        let body = text.strip_suffix("\r\n\r\n").unwrap_or(text);
        let (head, rest) = body.split_once(LINE_END).unwrap_or((body, ""));

        let token = head.split_whitespace().next().ok_or_else(|| {
            ProtocolError::MalformedMessage("message has no command line".into())
        })?;

        match token.parse::<MessageKind>()? {
            // Free-form kinds keep everything after the leading token.
            MessageKind::Error => Ok(Self::Error(strip_token(body, token))),
            MessageKind::BadRequest => Ok(Self::BadRequest(strip_token(body, token))),

            MessageKind::Start => {
                let tokens: Vec<&str> = body.split_whitespace().collect();
                if tokens != ["Start"] {
                    return Err(ProtocolError::MalformedMessage(format!(
                        "DGI sent malformed Start: {}",
                        tokens.join(" ")
                    )));
                }
                Ok(Self::Start)
            }

            MessageKind::PoliteDisconnect => {
                if body.split_whitespace().count() == 1 {
                    Ok(Self::PoliteDisconnect)
                } else {
                    DisconnectResponse::from_tokens(body).map(Self::DisconnectAck)
                }
            }

            MessageKind::DeviceStates => {
                expect_bare_head(head, token)?;
                parse_entries(rest).map(Self::DeviceStates)
            }
            MessageKind::DeviceCommands => {
                expect_bare_head(head, token)?;
                parse_entries(rest).map(Self::DeviceCommands)
            }

            MessageKind::Hello => {
                expect_bare_head(head, token)?;
                parse_hello(rest)
            }
        }
    }

    /// Build the Hello for a controller from `(type, name)` pairs.
    pub fn hello<'a>(
        controller: &str,
        devices: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self::Hello {
            controller: controller.to_string(),
            devices: devices
                .into_iter()
                .map(|(device_type, name)| DeviceInfo {
                    device_type: device_type.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        }
    }
}

fn strip_token(body: &str, token: &str) -> String {
    body.trim_start()
        .strip_prefix(token)
        .unwrap_or(body)
        .trim()
        .to_string()
}

fn expect_bare_head(head: &str, token: &str) -> Result<()> {
    if head != token {
        return Err(ProtocolError::MalformedMessage(format!(
            "malformed {token} header: {head:?}"
        )));
    }
    Ok(())
}

fn data_lines(rest: &str) -> impl Iterator<Item = &str> {
    rest.split(LINE_END).filter(|line| !line.trim().is_empty())
}

fn parse_entries(rest: &str) -> Result<Vec<SignalEntry>> {
    data_lines(rest)
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [device, signal, value] = fields.as_slice() else {
                return Err(ProtocolError::MalformedMessage(format!(
                    "malformed command in packet: {line}"
                )));
            };
            let value: f64 = value.parse().map_err(|_| {
                ProtocolError::MalformedMessage(format!("non-numeric value in packet: {line}"))
            })?;
            Ok(SignalEntry::new(*device, *signal, value))
        })
        .collect()
}

fn parse_hello(rest: &str) -> Result<Message> {
    let mut lines = data_lines(rest);
    let controller = lines
        .next()
        .map(str::trim)
        .ok_or_else(|| ProtocolError::MalformedMessage("Hello without controller name".into()))?;

    let devices = lines
        .map(|line| match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [device_type, name] => Ok(DeviceInfo {
                device_type: device_type.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ProtocolError::MalformedMessage(format!(
                "malformed device in Hello: {line}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Message::Hello {
        controller: controller.to_string(),
        devices,
    })
}

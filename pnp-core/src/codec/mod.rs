//! Delimiter-based framing for the plug-and-play wire protocol.
//!
//! The protocol has no length prefix: a message ends at the first blank
//! line, i.e. the four bytes `\r\n\r\n`. The peer must never pipeline, so a
//! terminator anywhere but at the tail of the accumulated bytes means the
//! stream is out of sync.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Line terminator used by every protocol line.
pub const LINE_END: &str = "\r\n";

/// Marks the end of a message: a line terminator followed by a blank line.
pub const TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Largest frame the codec will buffer before declaring the stream broken.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// `tokio_util` codec producing one complete message (terminator included)
/// per decoded item.
#[derive(Debug, Default)]
pub struct FrameCodec {
    // Offset from which the next terminator search starts; everything
    // before it has already been scanned.
    next_index: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
        .map(|pos| pos + from)
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A terminator may straddle the previous read boundary.
        let from = self.next_index.saturating_sub(TERMINATOR.len() - 1);

        match find_terminator(src, from) {
            Some(pos) if pos + TERMINATOR.len() == src.len() => {
                self.next_index = 0;
                Ok(Some(src.split().freeze()))
            }
            Some(_) => {
                self.next_index = 0;
                Err(ProtocolError::MalformedStream(format!(
                    "DGI sent two messages in a row:\n{}",
                    String::from_utf8_lossy(src)
                )))
            }
            None if src.len() > MAX_FRAME_SIZE => Err(ProtocolError::MalformedStream(format!(
                "frame too large: {} bytes without a terminator (max {MAX_FRAME_SIZE})",
                src.len()
            ))),
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(ProtocolError::ConnectionLost(
                "connection to DGI unexpectedly lost".into(),
            )),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.is_empty() {
            return Err(ProtocolError::MalformedMessage(
                "refusing to send an empty message".into(),
            ));
        }
        dst.extend_from_slice(&item);
        Ok(())
    }
}

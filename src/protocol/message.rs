//! Messages and the incoming message reassembler

use std::fmt::Display;

use bytes::Bytes;
use log::debug;

use crate::{
    error::{ProtocolError, Result},
    protocol::frame::{codec::OpCode, CloseFrame, FrameHeader},
};

/// A WebSocket message as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// A ping. Sent as is; received pings are answered automatically and only
    /// reach the application through the control callback.
    Ping(Vec<u8>),
    /// A pong.
    Pong(Vec<u8>),
    /// Start the closing handshake.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Whether this is a ping, pong or close.
    pub fn is_control(&self) -> bool {
        matches!(self, Message::Ping(_) | Message::Pong(_) | Message::Close(_))
    }

    /// Whether this is a text message.
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b.len(),
            Message::Close(c) => c.as_ref().map(|c| 2 + c.reason.len()).unwrap_or(0),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the message and return its payload bytes.
    pub fn into_data(self) -> Bytes {
        match self {
            Message::Text(s) => s.into_bytes().into(),
            Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b.into(),
            Message::Close(None) => Bytes::new(),
            Message::Close(Some(c)) => {
                let mut p = Vec::with_capacity(2 + c.reason.len());
                p.extend_from_slice(&u16::from(c.code).to_be_bytes());
                p.extend_from_slice(c.reason.as_bytes());
                p.into()
            }
        }
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Text(value)
    }
}

impl<'s> From<&'s str> for Message {
    fn from(value: &'s str) -> Self {
        Message::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::Binary(value)
    }
}

impl<'b> From<&'b [u8]> for Message {
    fn from(value: &'b [u8]) -> Self {
        Message::Binary(value.to_vec())
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Text(s) => write!(f, "Text({s})"),
            Message::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            Message::Ping(_) => write!(f, "Ping"),
            Message::Pong(_) => write!(f, "Pong"),
            Message::Close(Some(c)) => write!(f, "Close({c})"),
            Message::Close(None) => write!(f, "Close"),
        }
    }
}

/// Tracks the data message currently being read.
///
/// Control frames never pass through here.
#[derive(Debug, Default)]
pub(crate) struct MessageState {
    opcode: Option<OpCode>,
    size: u64,
    deflated: bool,
    continuation_expected: bool,
    done: bool,
}

impl MessageState {
    /// Account for an accepted data frame header.
    ///
    /// A data-starting frame opens a new message; a continuation adds to the
    /// running total. With a `limit` (0 means none) the total is checked here,
    /// before any of the frame's payload is read. Compressed messages are
    /// instead checked as they inflate, see [`add_inflated`](Self::add_inflated).
    pub(crate) fn begin_frame(&mut self, header: &FrameHeader, limit: usize) -> Result<()> {
        debug_assert!(!header.opcode.is_control());

        if header.opcode.is_data_start() {
            self.opcode = Some(header.opcode);
            self.size = 0;
            self.deflated = header.rsv1;
            self.done = false;
        }

        if !self.deflated {
            self.size = self.size.checked_add(header.len).ok_or(ProtocolError::MessageTooBig)?;
            if limit != 0 && self.size > limit as u64 {
                debug!("message of {} bytes exceeds limit of {limit}", self.size);
                return Err(ProtocolError::MessageTooBig.into());
            }
        }

        self.continuation_expected = !header.fin;
        Ok(())
    }

    /// Account for `n` bytes produced by the decompressor.
    pub(crate) fn add_inflated(&mut self, n: usize, limit: usize) -> Result<()> {
        self.size = self.size.saturating_add(n as u64);
        if limit != 0 && self.size > limit as u64 {
            debug!("inflated message exceeds limit of {limit}");
            return Err(ProtocolError::MessageTooBig.into());
        }
        Ok(())
    }

    /// The last frame of the message was read in full.
    pub(crate) fn finish(&mut self) {
        self.done = true;
    }

    /// Forget the message after a failure.
    pub(crate) fn reset(&mut self) {
        *self = MessageState::default();
    }

    #[inline]
    pub(crate) fn continuation_expected(&self) -> bool {
        self.continuation_expected
    }

    #[inline]
    pub(crate) fn is_text(&self) -> bool {
        self.opcode == Some(OpCode::Text)
    }

    #[inline]
    pub(crate) fn is_binary(&self) -> bool {
        self.opcode == Some(OpCode::Binary)
    }

    #[inline]
    pub(crate) fn is_deflated(&self) -> bool {
        self.deflated
    }

    /// The final frame has been read and its payload delivered, or nothing was read yet.
    #[inline]
    pub(crate) fn is_done(&self) -> bool {
        self.done || self.opcode.is_none()
    }
}

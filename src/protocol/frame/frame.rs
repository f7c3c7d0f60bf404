//! WebSocket frame header and control frame encoding

use std::fmt::Display;

use bytes::{BufMut, Bytes};
use log::trace;

use super::{
    codec::{CloseCode, OpCode},
    mask::{apply_mask, generate},
};
use crate::{
    error::{ProtocolError, Result},
    protocol::state::Role,
    MAX_CONTROL_FRAME_PAYLOAD,
};

/// Longest close reason that still fits a control frame next to the code.
const MAX_CLOSE_REASON: usize = MAX_CONTROL_FRAME_PAYLOAD - 2;

/// A struct representing the close command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The reason as a code.
    pub code: CloseCode,
    /// The reason as text string.
    pub reason: String,
}

impl CloseFrame {
    /// A close frame with the given code and an empty reason.
    pub fn new(code: CloseCode) -> Self {
        CloseFrame { code, reason: String::new() }
    }

    /// Attach a reason. Reasons longer than 123 bytes are cut at a char boundary.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        truncate_reason(&mut self.reason);
        self
    }

    /// Check a close frame we are about to send.
    ///
    /// The fields are public, so the reason is cut to 123 bytes here as well, and codes
    /// reserved for local use (1005, 1006, 1015 and unassigned ranges) are refused.
    pub(crate) fn into_outgoing(mut self) -> Result<CloseFrame> {
        if !self.code.allowed() {
            return Err(ProtocolError::BadCloseCode(self.code.into()).into());
        }
        truncate_reason(&mut self.reason);
        Ok(self)
    }

    /// Parse and validate a received close payload.
    ///
    /// An empty payload means the peer sent no code.
    pub fn parse(payload: &[u8]) -> Result<Option<CloseFrame>> {
        match payload.len() {
            0 => Ok(None),
            1 => Err(ProtocolError::BadCloseSize.into()),
            _ => {
                let raw = u16::from_be_bytes([payload[0], payload[1]]);
                let code = CloseCode::from(raw);
                if !code.allowed() {
                    return Err(ProtocolError::BadCloseCode(raw).into());
                }
                let reason = std::str::from_utf8(&payload[2..])
                    .map_err(|_| ProtocolError::BadClosePayload)?
                    .to_owned();

                Ok(Some(CloseFrame { code, reason }))
            }
        }
    }

    fn to_payload(&self) -> Vec<u8> {
        let mut p = Vec::with_capacity(self.reason.len() + 2);
        p.extend_from_slice(&u16::from(self.code).to_be_bytes());
        p.extend_from_slice(self.reason.as_bytes());
        p
    }
}

fn truncate_reason(reason: &mut String) {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
}

impl Display for CloseFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.reason, self.code)
    }
}

/// What the decoder needs to know about the connection to validate a header.
#[derive(Debug, Clone, Copy)]
pub struct HeaderRules {
    /// Our side of the connection.
    pub role: Role,
    /// A data message is open and awaits continuation frames.
    pub continuation_expected: bool,
    /// permessage-deflate was negotiated, so `rsv1` may start a message.
    pub deflate: bool,
}

/// A struct representing a WebSocket frame header.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Indicates is the frame is the last one of a possibly fragmented message
    pub fin: bool,
    /// Reserved for protocol extensions. Signals a compressed message under permessage-deflate.
    pub rsv1: bool,
    /// Reserved for protocol extensions.
    pub rsv2: bool,
    /// Reserved for protocol extensions.
    pub rsv3: bool,
    /// WebSocket protocol opcode.
    pub opcode: OpCode,
    /// Payload length.
    pub len: u64,
    /// A frame mask (if any)
    pub mask: Option<[u8; 4]>,
}

impl Default for FrameHeader {
    fn default() -> Self {
        FrameHeader {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode: OpCode::Close,
            len: 0,
            mask: None,
        }
    }
}

impl FrameHeader {
    /// > The longest possible header is 14 bytes, which would represent a message sent from
    /// > the client to the server with a payload greater than 64KB.
    pub const MAX_HEADER_SIZE: usize = 14;

    /// Size of the encoded header.
    #[allow(clippy::len_without_is_empty)]
    pub fn header_len(&self) -> usize {
        2 + Length::for_len(self.len).additional() + if self.mask.is_some() { 4 } else { 0 }
    }

    /// Encode the header.
    pub fn format(&self, output: &mut impl BufMut) {
        let code: u8 = self.opcode.into();

        let first_byte = code
            | if self.fin { 0x80 } else { 0 }
            | if self.rsv1 { 0x40 } else { 0 }
            | if self.rsv2 { 0x20 } else { 0 }
            | if self.rsv3 { 0x10 } else { 0 };

        let len = Length::for_len(self.len);
        let second_byte = len.len_byte() | if self.mask.is_some() { 0x80 } else { 0 };

        output.put_slice(&[first_byte, second_byte]);

        match len {
            Length::U8(_) => (),
            Length::U16 => output.put_u16(self.len as u16),
            Length::U64 => output.put_u64(self.len),
        }

        if let Some(ref mask) = self.mask {
            output.put_slice(mask);
        }
    }

    /// Decode a header from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. For control frames this
    /// also waits until the entire payload is buffered. On success the number of
    /// header bytes consumed is returned along with the header; the payload is
    /// left in place and still masked.
    pub fn decode(buf: &[u8], rules: &HeaderRules) -> Result<Option<(Self, usize)>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let (a, b) = (buf[0], buf[1]);

        let len_byte = b & 0x7F;
        let masked = b & 0x80 != 0;
        let need = Length::for_byte(len_byte).additional() + if masked { 4 } else { 0 };
        if buf.len() < 2 + need {
            return Ok(None);
        }

        let fin = a & 0x80 != 0;
        let rsv1 = a & 0x40 != 0;
        let rsv2 = a & 0x20 != 0;
        let rsv3 = a & 0x10 != 0;
        let opcode = OpCode::from(a);

        match opcode {
            OpCode::Text | OpCode::Binary => {
                if rules.continuation_expected {
                    return Err(ProtocolError::BadDataFrame.into());
                }
                if rsv2 || rsv3 || (rsv1 && !rules.deflate) {
                    return Err(ProtocolError::BadReservedBits.into());
                }
            }
            OpCode::Continuation => {
                if !rules.continuation_expected {
                    return Err(ProtocolError::BadContinuation.into());
                }
                if rsv1 || rsv2 || rsv3 {
                    return Err(ProtocolError::BadReservedBits.into());
                }
            }
            OpCode::Reserved(code) => return Err(ProtocolError::BadOpcode(code).into()),
            OpCode::Close | OpCode::Ping | OpCode::Pong => {
                if !fin {
                    return Err(ProtocolError::BadControlFragment.into());
                }
                if len_byte as usize > MAX_CONTROL_FRAME_PAYLOAD {
                    return Err(ProtocolError::BadControlSize.into());
                }
                if rsv1 || rsv2 || rsv3 {
                    return Err(ProtocolError::BadReservedBits.into());
                }
            }
        }

        match rules.role {
            Role::Server if !masked => return Err(ProtocolError::BadUnmaskedFrame.into()),
            Role::Client if masked => return Err(ProtocolError::BadMaskedFrame.into()),
            _ => (),
        }

        if opcode.is_control() && buf.len() < 2 + need + len_byte as usize {
            return Ok(None);
        }

        let mut pos = 2;
        let len = match Length::for_byte(len_byte) {
            Length::U8(n) => u64::from(n),
            Length::U16 => {
                let len = u64::from(u16::from_be_bytes([buf[2], buf[3]]));
                if len < 126 {
                    return Err(ProtocolError::BadSize.into());
                }
                pos += 2;
                len
            }
            Length::U64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len < 65536 || len >> 63 != 0 {
                    return Err(ProtocolError::BadSize.into());
                }
                pos += 8;
                len
            }
        };

        let mask = if masked {
            let mut key = [0u8; 4];
            key.copy_from_slice(&buf[pos..pos + 4]);
            pos += 4;
            Some(key)
        } else {
            None
        };

        let header = FrameHeader { fin, rsv1, rsv2, rsv3, opcode, len, mask };
        trace!("decoded header {opcode} fin={fin} len={len} masked={masked}");

        Ok(Some((header, pos)))
    }
}

/// A complete outgoing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    /// Initializes a new frame
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Frame { header, payload }
    }

    /// Create a new data frame.
    #[inline]
    pub fn new_data(data: impl Into<Bytes>, opcode: OpCode, fin: bool) -> Frame {
        debug_assert!(!opcode.is_control(), "Invalid opcode for data frame");

        Frame { header: FrameHeader { fin, opcode, ..Default::default() }, payload: data.into() }
    }

    /// Create a new Ping control frame.
    #[inline]
    pub fn new_ping(data: impl Into<Bytes>) -> Frame {
        Frame { header: FrameHeader { opcode: OpCode::Ping, ..Default::default() }, payload: data.into() }
    }

    /// Create a new Pong control frame.
    #[inline]
    pub fn new_pong(data: impl Into<Bytes>) -> Frame {
        Frame { header: FrameHeader { opcode: OpCode::Pong, ..Default::default() }, payload: data.into() }
    }

    /// Create a new Close control frame.
    #[inline]
    pub fn new_close(msg: Option<&CloseFrame>) -> Frame {
        let payload = msg.map(CloseFrame::to_payload).unwrap_or_default();
        Frame { header: FrameHeader::default(), payload: payload.into() }
    }

    /// Get a reference to the frame's header.
    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Get a mutable reference to the frame's header.
    #[inline]
    pub fn header_mut(&mut self) -> &mut FrameHeader {
        &mut self.header
    }

    /// Get a reference to the frame's payload.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Length of the encoded frame.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let mut header = self.header.clone();
        header.len = self.payload.len() as u64;
        header.header_len() + self.payload.len()
    }

    /// Serialize header and payload, masking the payload with a fresh key iff `role` is a client.
    pub fn into_buf(mut self, role: Role, buf: &mut Vec<u8>) {
        self.header.len = self.payload.len() as u64;
        self.header.mask = match role {
            Role::Client => Some(generate()),
            Role::Server => None,
        };

        buf.reserve(self.header.header_len() + self.payload.len());
        self.header.format(buf);

        let start = buf.len();
        buf.extend_from_slice(&self.payload);
        if let Some(mask) = self.header.mask {
            apply_mask(&mut buf[start..], mask);
        }
    }
}

/// Build a complete Close, Ping or Pong frame ready for the wire.
pub fn encode_control(opcode: OpCode, payload: &[u8], role: Role) -> Vec<u8> {
    debug_assert!(opcode.is_control() && !opcode.is_reserved());
    debug_assert!(payload.len() <= MAX_CONTROL_FRAME_PAYLOAD);

    let frame = Frame {
        header: FrameHeader { opcode, ..Default::default() },
        payload: Bytes::copy_from_slice(payload),
    };

    let mut out = Vec::with_capacity(FrameHeader::MAX_HEADER_SIZE + payload.len());
    frame.into_buf(role, &mut out);
    out
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[FRAME] final: {}, reserved: {} {} {}, opcode: {}, payload-length: {}",
            self.header.fin,
            self.header.rsv1,
            self.header.rsv2,
            self.header.rsv3,
            self.header.opcode,
            self.payload.len(),
        )
    }
}

enum Length {
    U8(u8),
    U16,
    U64,
}

impl Length {
    #[inline]
    fn for_len(len: u64) -> Self {
        if len < 126 {
            Length::U8(len as u8)
        } else if len < 65536 {
            Length::U16
        } else {
            Length::U64
        }
    }

    #[inline]
    fn additional(&self) -> usize {
        match *self {
            Self::U8(_) => 0,
            Self::U16 => 2,
            Self::U64 => 8,
        }
    }

    #[inline]
    fn len_byte(&self) -> u8 {
        match *self {
            Self::U8(b) => b,
            Self::U16 => 126,
            Self::U64 => 127,
        }
    }

    #[inline]
    fn for_byte(byte: u8) -> Self {
        match byte & 0x7F {
            126 => Length::U16,
            127 => Length::U64,
            b => Length::U8(b),
        }
    }
}

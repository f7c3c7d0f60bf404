//! Codes defined in RFC 6455

use std::fmt::Display;

/// WebSocket frame opcode as in RFC 6455.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OpCode {
    /// A continuation frame
    Continuation,
    /// A text frame
    Text,
    /// A binary frame
    Binary,
    /// A close frame
    Close,
    /// A ping frame
    Ping,
    /// A pong frame
    Pong,
    /// 0x3-0x7 and 0xB-0xF are reserved for future data and control frames
    Reserved(u8),
}

impl OpCode {
    /// Whether this opcode belongs to the control range (0x8-0xF).
    ///
    /// Reserved control opcodes count as control so that the fin and size rules
    /// apply to them before they are rejected.
    #[inline]
    pub fn is_control(self) -> bool {
        u8::from(self) & 0x08 != 0
    }

    /// Whether this opcode is one of the reserved values.
    #[inline]
    pub fn is_reserved(self) -> bool {
        matches!(self, Self::Reserved(_))
    }

    /// Whether this opcode starts a new data message.
    #[inline]
    pub fn is_data_start(self) -> bool {
        matches!(self, Self::Text | Self::Binary)
    }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Continuation => write!(f, "CONTINUE"),
            Self::Text => write!(f, "TEXT"),
            Self::Binary => write!(f, "BINARY"),
            Self::Close => write!(f, "CLOSE"),
            Self::Ping => write!(f, "PING"),
            Self::Pong => write!(f, "PONG"),
            Self::Reserved(other) => write!(f, "RESERVED_{other}"),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> Self {
        match value {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(i) => i & 0x0F,
        }
    }
}

impl From<u8> for OpCode {
    /// Only the low nibble is significant.
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            i => Self::Reserved(i),
        }
    }
}

/// Kind of control frame reported to the control callback.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FrameType {
    /// A close frame was received
    Close,
    /// A ping frame was received
    Ping,
    /// A pong frame was received
    Pong,
}

/// Status code used to indicate why an endpoint is closing the WebSocket connection.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CloseCode {
    /// Indicates a normal closure, meaning that the purpose for
    /// which the connection was established has been fulfilled.
    Normal,

    /// Indicates that an endpoint is "going away", such as a server
    /// going down or a browser having navigated away from a page.
    Away,

    /// Indicates that an endpoint is terminating the connection due
    /// to a protocol error.
    Protocol,

    /// Indicates that an endpoint is terminating the connection
    /// because it has received a type of data it cannot accept.
    Unsupported,

    /// Indicates that no status code was included in a closing frame.
    /// Never sent on the wire.
    Status,

    /// Indicates an abnormal closure without a close frame.
    /// Never sent on the wire.
    Abnormal,

    /// Indicates that an endpoint is terminating the connection
    /// because it has received data within a message that was not
    /// consistent with the type of the message (e.g., non-UTF-8 \[RFC3629\]
    /// data within a text message).
    Invalid,

    /// Indicates that an endpoint is terminating the connection
    /// because it has received a message that violates its policy.
    Policy,

    /// Indicates that an endpoint is terminating the connection
    /// because it has received a message that is too big for it to
    /// process.
    Size,

    /// Indicates that an endpoint (client) is terminating the
    /// connection because it has expected the server to negotiate one or
    /// more extension, but the server didn't return them in the response
    /// message of the WebSocket handshake.
    Extension,

    /// Indicates that a server is terminating the connection because
    /// it encountered an unexpected condition that prevented it from
    /// fulfilling the request.
    Error,

    /// Indicates that the server is restarting.
    Restart,

    /// Indicates that the server is overloaded.
    Again,

    #[doc(hidden)]
    Tls,

    #[doc(hidden)]
    Reserved(u16),

    #[doc(hidden)]
    Iana(u16),

    #[doc(hidden)]
    Library(u16),

    #[doc(hidden)]
    Bad(u16),
}

impl CloseCode {
    /// Check if this CloseCode may appear in a close frame on the wire.
    pub fn allowed(self) -> bool {
        !matches!(self, Self::Bad(_) | Self::Reserved(_) | Self::Status | Self::Abnormal | Self::Tls)
    }
}

impl Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code: u16 = (*self).into();
        write!(f, "{code}")
    }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> u16 {
        match value {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Tls => 1015,
            CloseCode::Reserved(other)
            | CloseCode::Iana(other)
            | CloseCode::Library(other)
            | CloseCode::Bad(other) => other,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::Status,
            1006 => Self::Abnormal,
            1007 => Self::Invalid,
            1008 => Self::Policy,
            1009 => Self::Size,
            1010 => Self::Extension,
            1011 => Self::Error,
            1012 => Self::Restart,
            1013 => Self::Again,
            1015 => Self::Tls,
            1016..=2999 => Self::Reserved(value),
            3000..=3999 => Self::Iana(value),
            4000..=4999 => Self::Library(value),
            _ => Self::Bad(value),
        }
    }
}

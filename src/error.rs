//! Error handling

use std::{io, str::Utf8Error, string::FromUtf8Error};

#[cfg(feature = "handshake")]
use http::Response;
use thiserror::Error;

use crate::protocol::frame::codec::CloseCode;

/// Generic result type
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible WebSocket errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer closed the WebSocket connection and the closing handshake finished.
    ///
    /// This is what a read returns once the close frame has been echoed and the
    /// transport was torn down. It's not an error as such and nothing wrong happened,
    /// the close code and reason are available from
    /// [`WebSocketStream::close_reason`](crate::protocol::websocket::WebSocketStream::close_reason).
    #[error("Connection closed")]
    Closed,

    /// The operation was invoked while the connection was not open, or it was
    /// resumed after the connection had already become terminal.
    ///
    /// Writing after a close, or reading while a close owns the read side,
    /// causes this. No bytes were exchanged with the peer.
    #[error("Operation aborted")]
    OperationAborted,

    /// Input-output error. These are errors with the underlying transport and
    /// are always fatal to the connection.
    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),

    /// Protocol violation by the peer.
    #[error("Protocol Error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The upgrade handshake failed validation.
    #[error("Handshake Error: {0}")]
    Handshake(#[from] HandshakeError),

    /// UTF-8 coding error outside of frame payloads.
    #[error("UTF-8 Error: {0}")]
    Utf8(String),

    /// - When reading: buffer capacity exhausted.
    /// - When configuring: a size limit was violated.
    #[error("Capacity Error: {0}")]
    Capacity(#[from] CapacityError),

    /// The permessage-deflate codec failed.
    #[error("Deflate Error: {0}")]
    Deflate(String),

    /// HTTP error. Either the server answered the upgrade request with something
    /// other than `101 Switching Protocols`, or a server callback rejected the request.
    #[error("HTTP Error: {}", .0.status())]
    #[cfg(feature = "handshake")]
    Http(Box<Response<Option<Vec<u8>>>>),

    /// HTTP format error.
    #[error("HTTP format error: {0}")]
    #[cfg(feature = "handshake")]
    HttpFormat(#[from] http::Error),

    /// Invalid URL.
    #[error("URL Error: {0}")]
    Url(#[from] UrlError),
}

impl Error {
    /// Close code sent to the peer when this error fails the connection.
    pub(crate) fn close_code(&self) -> CloseCode {
        match self {
            Error::Protocol(ProtocolError::MessageTooBig) => CloseCode::Size,
            Error::Protocol(ProtocolError::BadFramePayload) => CloseCode::Invalid,
            Error::Capacity(_) => CloseCode::Size,
            _ => CloseCode::Protocol,
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::Utf8(value.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Utf8(value.to_string())
    }
}

impl From<flate2::CompressError> for Error {
    fn from(value: flate2::CompressError) -> Self {
        Error::Deflate(value.to_string())
    }
}

impl From<flate2::DecompressError> for Error {
    fn from(value: flate2::DecompressError) -> Self {
        Error::Deflate(value.to_string())
    }
}

#[cfg(feature = "handshake")]
impl From<http::header::InvalidHeaderName> for Error {
    fn from(value: http::header::InvalidHeaderName) -> Self {
        Error::HttpFormat(value.into())
    }
}

#[cfg(feature = "handshake")]
impl From<http::header::InvalidHeaderValue> for Error {
    fn from(value: http::header::InvalidHeaderValue) -> Self {
        Error::HttpFormat(value.into())
    }
}

#[cfg(feature = "handshake")]
impl From<http::header::ToStrError> for Error {
    fn from(value: http::header::ToStrError) -> Self {
        Error::Utf8(value.to_string())
    }
}

#[cfg(feature = "handshake")]
impl From<http::uri::InvalidUri> for Error {
    fn from(value: http::uri::InvalidUri) -> Self {
        Error::HttpFormat(value.into())
    }
}

#[cfg(feature = "handshake")]
impl From<http::status::InvalidStatusCode> for Error {
    fn from(value: http::status::InvalidStatusCode) -> Self {
        Error::HttpFormat(value.into())
    }
}

#[cfg(feature = "handshake")]
impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        match value {
            httparse::Error::TooManyHeaders => Error::Capacity(CapacityError::TooManyHeaders),
            e => Error::Handshake(HandshakeError::Httparse(e)),
        }
    }
}

/// Indicates the specific type/cause of a frame-level protocol error.
///
/// Every one of these fails the connection: the engine sends a close frame
/// carrying [`CloseCode::Protocol`] (or a more specific code) and tears the
/// transport down.
#[allow(missing_copy_implementations)]
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    /// Encountered a reserved opcode.
    #[error("Received reserved opcode: {0}")]
    BadOpcode(u8),

    /// Received a data frame while a continuation frame was expected.
    #[error("Received data frame while a continuation was expected")]
    BadDataFrame,

    /// Received a continuation frame without an open message.
    #[error("Received continuation frame without open message")]
    BadContinuation,

    /// Reserved bits are set without an extension that defines them.
    #[error("Encountered frame with non-zero reserved bits")]
    BadReservedBits,

    /// Control frames must not be fragmented.
    #[error("Control frame must not be fragmented")]
    BadControlFragment,

    /// Control frames must have a payload of 125 bytes or less.
    #[error("Control frame payload too large")]
    BadControlSize,

    /// The server must close the connection when an unmasked frame is received.
    #[error("Received unmasked frame from client")]
    BadUnmaskedFrame,

    /// The client must close the connection when a masked frame is received.
    #[error("Received masked frame from server")]
    BadMaskedFrame,

    /// The extended payload length was not encoded in its minimal form.
    #[error("Payload length is not canonical")]
    BadSize,

    /// The message exceeds the configured maximum size.
    #[error("Message exceeds the configured maximum size")]
    MessageTooBig,

    /// A text message carried invalid UTF-8.
    #[error("Invalid UTF-8 in text message")]
    BadFramePayload,

    /// A close frame payload had a length of exactly one byte.
    #[error("Invalid close frame payload size")]
    BadCloseSize,

    /// A close frame carried a code that may not appear on the wire.
    #[error("Invalid close code: {0}")]
    BadCloseCode(u16),

    /// A close frame reason was not valid UTF-8.
    #[error("Invalid UTF-8 in close reason")]
    BadClosePayload,
}

/// Indicates the specific type/cause of an upgrade handshake failure.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum HandshakeError {
    /// Use of the wrong HTTP method (the WebSocket protocol requires GET).
    #[error("Invalid HTTP method (must be GET)")]
    BadMethod,

    /// Wrong HTTP version used (the WebSocket protocol requires version 1.1 or higher).
    #[error("Unsupported HTTP version (must be at least HTTP/1.1)")]
    BadHttpVersion,

    /// The upgrade response did not carry `101 Switching Protocols`.
    #[error("Unexpected response status {0}")]
    BadStatus(u16),

    /// Missing `Host` header in the request.
    #[error("Missing 'Host' header")]
    NoHost,

    /// Missing `Connection: upgrade` HTTP header.
    #[error("Missing 'Connection: upgrade' header")]
    NoConnection,

    /// Missing `Upgrade: websocket` HTTP header.
    #[error("Missing 'Upgrade: websocket' header")]
    NoUpgrade,

    /// Missing `Sec-WebSocket-Key` HTTP header.
    #[error("Missing 'Sec-WebSocket-Key' header")]
    NoSecKey,

    /// `Sec-WebSocket-Key` does not decode to 16 bytes.
    #[error("Malformed 'Sec-WebSocket-Key' header")]
    BadSecKey,

    /// Missing `Sec-WebSocket-Version` HTTP header.
    #[error("Missing 'Sec-WebSocket-Version' header")]
    NoSecVersion,

    /// Unsupported `Sec-WebSocket-Version`.
    #[error("Unsupported 'Sec-WebSocket-Version' (must be 13)")]
    BadSecVersion,

    /// Missing `Sec-WebSocket-Accept` HTTP header.
    #[error("Missing 'Sec-WebSocket-Accept' header")]
    NoSecAccept,

    /// `Sec-WebSocket-Accept` does not match the key that was sent.
    #[error("Mismatched 'Sec-WebSocket-Accept' header")]
    BadSecAccept,

    /// The server negotiated an extension we did not offer.
    #[error("Server negotiated an unsupported extension")]
    BadExtension,

    /// Garbage data encountered after client request.
    #[error("Junk after client request")]
    JunkAfterRequest,

    /// Custom rejection responses must be unsuccessful.
    #[error("Custom response must not be successful")]
    CustomResponseSuccessful,

    /// No more data while still performing handshake.
    #[error("Handshake incomplete")]
    IncompleteHandshake,

    /// The peer sent the HTTP head in a pattern that looks like a slow-drip attack.
    #[error("Detected attempted attack")]
    AttackAttempt,

    /// Wrapper around a [`httparse::Error`] value.
    #[error("httparse error: {0}")]
    #[cfg(feature = "handshake")]
    Httparse(#[from] httparse::Error),
}

/// Indicates the specific type/cause of a capacity error.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CapacityError {
    /// Too many headers provided (see [`httparse::Error::TooManyHeaders`]).
    #[error("Too many headers received")]
    TooManyHeaders,

    /// The destination buffer cannot hold more bytes.
    #[error("Buffer overflow: {size} > {max}")]
    BufferOverflow {
        /// The size the buffer would have reached.
        size: usize,
        /// The maximum size of the buffer.
        max: usize,
    },
}

/// Indicates the specific type/cause of URL error.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum UrlError {
    /// The URL does not include a host name.
    #[error("Missing host name in URL")]
    MissingHost,

    /// Unsupported URL scheme used (only `ws://` or `wss://` may be used).
    #[error("Unsupported URL scheme (expected 'ws://' or 'wss://')")]
    UnsupportedScheme,

    /// The URL does not include a path/query.
    #[error("No path / query segment in URL")]
    NoPathOrQuery,
}

//! Surge: an RFC 6455 WebSocket engine over any async byte stream
//!
//! The connection engine lives in [`protocol::websocket::WebSocketStream`]. It
//! runs over anything implementing [`stream::Transport`], performs the HTTP/1
//! upgrade (behind the `handshake` feature) and lets reads, writes, pings and a
//! close run concurrently on a single task. [`sync::WebSocket`] drives the same
//! engine over blocking `std::io` streams.
#![warn(missing_docs, missing_debug_implementations, unused_must_use, unused_import_braces)]
#![allow(clippy::result_large_err)]

pub mod buffer;
pub mod error;
pub mod protocol;
pub mod stream;
pub mod sync;

#[cfg(feature = "handshake")]
pub mod client;
#[cfg(feature = "handshake")]
pub mod handshake;
#[cfg(feature = "handshake")]
pub mod server;

/// Constant for maximum message payload length
pub const MAX_ALLOWED_LEN: usize = 16 * 1024 * 1024;
/// Constant for maximum control frame payload size
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Smallest internal read buffer: a full header plus a full control frame.
pub(crate) const MIN_READ_BUFFER: usize = 256;

pub use crate::{
    buffer::DynamicBuffer,
    error::{Error, Result},
    protocol::{
        compression::DeflateConfig,
        config::WebSocketConfig,
        frame::{codec::CloseCode, CloseFrame},
        message::Message,
        state::{Role, Status},
        websocket::WebSocketStream,
    },
    stream::{BlockingStream, Transport},
    sync::WebSocket,
};

#[cfg(feature = "handshake")]
pub use crate::{client::client, server::accept};

//! Connection configuration

use crate::{protocol::compression::DeflateConfig, MAX_ALLOWED_LEN};

/// Default size of outgoing frames when messages are fragmented automatically.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4096;

/// Default capacity of the internal read buffer.
pub const DEFAULT_READ_BUFFER_MAX: usize = 128 * 1024;

/// The configuration for a WebSocket connection.
///
/// # Example
/// ```
/// # use surge_ws::protocol::config::WebSocketConfig;
/// let conf = WebSocketConfig::default()
///     .read_message_max(1024 * 1024)
///     .write_buffer_size(16 * 1024);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    /// Largest message accepted from the peer, after decompression. `0` means no limit.
    pub read_message_max: usize,
    /// Payload size of each frame when outgoing messages are fragmented.
    pub write_buffer_size: usize,
    /// Split outgoing messages into frames of [`write_buffer_size`](Self::write_buffer_size).
    pub auto_fragment: bool,
    /// Capacity of the buffer holding bytes read from the transport but not yet parsed.
    /// Must be at least large enough for a header plus a full control frame.
    pub read_buffer_max: usize,
    /// permessage-deflate parameters.
    pub compression: DeflateConfig,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            read_message_max: MAX_ALLOWED_LEN,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            auto_fragment: true,
            read_buffer_max: DEFAULT_READ_BUFFER_MAX,
            compression: DeflateConfig::default(),
        }
    }
}

impl WebSocketConfig {
    /// Set [`Self::read_message_max`].
    pub fn read_message_max(mut self, max: usize) -> Self {
        self.read_message_max = max;
        self
    }

    /// Set [`Self::write_buffer_size`]. Zero is treated as one.
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size.max(1);
        self
    }

    /// Set [`Self::auto_fragment`].
    pub fn auto_fragment(mut self, enabled: bool) -> Self {
        self.auto_fragment = enabled;
        self
    }

    /// Set [`Self::read_buffer_max`].
    pub fn read_buffer_max(mut self, max: usize) -> Self {
        self.read_buffer_max = max.max(crate::MIN_READ_BUFFER);
        self
    }

    /// Set [`Self::compression`].
    pub fn compression(mut self, compression: DeflateConfig) -> Self {
        self.compression = compression;
        self
    }
}

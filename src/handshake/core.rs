//! Handshake keys

use base64::Engine;
use sha1::{Digest, Sha1};

/// Derives the `Sec-WebSocket-Accept` header value from a `Sec-WebSocket-Key` request header.
///
/// This function can be used to perform a handshake before passing a raw stream to
/// [`WebSocketStream::from_raw_socket`][crate::protocol::websocket::WebSocketStream::from_raw_socket]
pub fn derive_accept_key(req_key: &[u8]) -> String {
    const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

    let mut hasher = Sha1::default();
    <Sha1 as Digest>::update(&mut hasher, req_key);
    <Sha1 as Digest>::update(&mut hasher, WS_GUID);

    base64::engine::general_purpose::STANDARD.encode(<Sha1 as Digest>::finalize(hasher))
}

/// Generates a random key for the `Sec-WebSocket-Key` header
pub fn generate_key() -> String {
    let r: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(r)
}

/// Whether `key` is the base64 encoding of 16 bytes.
pub(crate) fn is_valid_key(key: &[u8]) -> bool {
    key.len() == 24
        && base64::engine::general_purpose::STANDARD
            .decode(key)
            .map(|raw| raw.len() == 16)
            .unwrap_or(false)
}

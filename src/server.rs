//! Utilities to accept an incoming WebSocket connection on a server

use crate::{
    error::Result,
    handshake::server::{Callback, NoCallback},
    protocol::{config::WebSocketConfig, state::Role, websocket::WebSocketStream},
    stream::Transport,
};

/// Accept the given transport as a WebSocket.
///
/// This function reads the client's upgrade request from the transport and
/// answers it. Any `AsyncRead + AsyncWrite + Unpin` stream is supported; for
/// TLS, hand in the stream of your TLS library.
pub async fn accept<T: Transport>(transport: T) -> Result<WebSocketStream<T>> {
    accept_with_config(transport, None).await
}

/// Accept the given transport as a WebSocket.
///
/// Uses a configuration provided as an argument. Calling it with `None` will use the default one
/// used by `accept()`.
pub async fn accept_with_config<T: Transport>(
    transport: T,
    config: Option<WebSocketConfig>,
) -> Result<WebSocketStream<T>> {
    accept_header_with_config(transport, NoCallback, config).await
}

/// Accept the given transport as a WebSocket.
///
/// This function does the same as `accept()` but accepts an extra callback
/// for header processing. The callback receives headers of the incoming
/// requests and is able to add extra headers to the reply.
pub async fn accept_header<T: Transport, C: Callback>(transport: T, callback: C) -> Result<WebSocketStream<T>> {
    accept_header_with_config(transport, callback, None).await
}

/// Accept the given transport as a WebSocket.
///
/// Uses a configuration provided as an argument. Calling it with `None` will use the default one
/// used by `accept_header()`.
pub async fn accept_header_with_config<T: Transport, C: Callback>(
    transport: T,
    callback: C,
    config: Option<WebSocketConfig>,
) -> Result<WebSocketStream<T>> {
    let ws = WebSocketStream::with_config(transport, Role::Server, config.unwrap_or_default());
    ws.accept_with(callback).await?;
    Ok(ws)
}

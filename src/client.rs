//! Utilities to open a WebSocket connection as a client

use crate::{
    error::Result,
    handshake::client::{IntoClientRequest, Response},
    protocol::{config::WebSocketConfig, state::Role, websocket::WebSocketStream},
    stream::Transport,
};

/// Perform the client handshake over an established transport.
///
/// `request` may be a `ws://` URI string, an [`http::Uri`], a prepared
/// [`Request`](crate::handshake::client::Request), or a `url::Url` with the
/// `url` feature. Connecting the transport (and any TLS on top) is up to the
/// caller.
pub async fn client<T: Transport, R: IntoClientRequest>(request: R, transport: T) -> Result<(WebSocketStream<T>, Response)> {
    client_with_config(request, transport, None).await
}

/// The same as [`client`] but with a custom configuration.
pub async fn client_with_config<T: Transport, R: IntoClientRequest>(
    request: R,
    transport: T,
    config: Option<WebSocketConfig>,
) -> Result<(WebSocketStream<T>, Response)> {
    let request = request.into_client_request()?;
    let ws = WebSocketStream::with_config(transport, Role::Client, config.unwrap_or_default());
    let response = ws.handshake_request(request).await?;
    Ok((ws, response))
}

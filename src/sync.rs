//! Blocking WebSocket
//!
//! [`WebSocket`] runs the asynchronous engine over a blocking `std::io` stream,
//! driving each operation to completion on the calling thread.

use std::io::{Read, Write};

use futures::executor::block_on;

use crate::{
    buffer::DynamicBuffer,
    error::Result,
    protocol::{
        config::WebSocketConfig,
        frame::{codec::FrameType, CloseFrame},
        message::Message,
        state::{Role, Status},
        websocket::WebSocketStream,
    },
    stream::{BlockingStream, Shutdown},
};

#[cfg(feature = "handshake")]
use crate::handshake::{
    client::{IntoClientRequest, Response},
    server::{Callback, NoCallback, Request},
};

/// A WebSocket over a blocking stream such as [`std::net::TcpStream`].
#[derive(Debug)]
pub struct WebSocket<S> {
    inner: WebSocketStream<BlockingStream<S>>,
}

impl<S> WebSocket<S> {
    /// A connection that still needs its upgrade handshake.
    pub fn new(stream: S, role: Role) -> Self {
        Self::with_config(stream, role, WebSocketConfig::default())
    }

    /// Like [`new`](Self::new) with a custom configuration.
    pub fn with_config(stream: S, role: Role, config: WebSocketConfig) -> Self {
        WebSocket { inner: WebSocketStream::with_config(BlockingStream::new(stream), role, config) }
    }

    /// Wrap a stream on which the upgrade already happened.
    pub fn from_raw_socket(stream: S, role: Role, config: WebSocketConfig) -> Self {
        WebSocket { inner: WebSocketStream::from_raw_socket(BlockingStream::new(stream), role, config) }
    }

    /// Like [`from_raw_socket`](Self::from_raw_socket) with bytes already read past the HTTP head.
    pub fn from_partially_read(stream: S, part: Vec<u8>, role: Role, config: WebSocketConfig) -> Self {
        WebSocket {
            inner: WebSocketStream::from_partially_read(BlockingStream::new(stream), part, role, config),
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.inner.status()
    }

    /// Our side of the connection.
    pub fn role(&self) -> Role {
        self.inner.role()
    }

    /// The configuration this connection runs with.
    pub fn config(&self) -> &WebSocketConfig {
        self.inner.config()
    }

    /// The peer's close frame, once received.
    pub fn close_reason(&self) -> Option<CloseFrame> {
        self.inner.close_reason()
    }

    /// Choose text (`true`) or binary for the next outgoing message.
    pub fn set_text(&mut self, text: bool) {
        self.inner.set_text(text)
    }

    /// The message being read is text.
    pub fn got_text(&self) -> bool {
        self.inner.got_text()
    }

    /// The message being read is binary.
    pub fn got_binary(&self) -> bool {
        self.inner.got_binary()
    }

    /// The last read finished a message.
    pub fn is_message_done(&self) -> bool {
        self.inner.is_message_done()
    }

    /// See [`WebSocketStream::set_control_callback`].
    pub fn set_control_callback(&mut self, callback: impl FnMut(FrameType, &[u8]) + 'static) {
        self.inner.set_control_callback(callback)
    }

    /// The engine underneath.
    pub fn get_ref(&self) -> &WebSocketStream<BlockingStream<S>> {
        &self.inner
    }

    /// Returns the inner stream.
    pub fn into_inner(self) -> S {
        self.inner.into_inner().into_inner()
    }
}

impl<S: Read + Write + Shutdown + Unpin> WebSocket<S> {
    /// Perform the client handshake. See [`WebSocketStream::handshake`].
    #[cfg(feature = "handshake")]
    pub fn handshake(&mut self, host: &str, target: &str) -> Result<Response> {
        block_on(self.inner.handshake(host, target))
    }

    /// Perform the client handshake with a prepared request.
    #[cfg(feature = "handshake")]
    pub fn handshake_request(&mut self, request: impl IntoClientRequest) -> Result<Response> {
        let request = request.into_client_request()?;
        block_on(self.inner.handshake_request(request))
    }

    /// Read and answer the client's upgrade request.
    #[cfg(feature = "handshake")]
    pub fn accept(&mut self) -> Result<()> {
        self.accept_with(NoCallback)
    }

    /// Like [`accept`](Self::accept) with a callback.
    #[cfg(feature = "handshake")]
    pub fn accept_with<C: Callback>(&mut self, callback: C) -> Result<()> {
        block_on(self.inner.accept_with(callback))
    }

    /// Answer an upgrade request that was already read.
    #[cfg(feature = "handshake")]
    pub fn accept_request(&mut self, request: &Request) -> Result<()> {
        block_on(self.inner.accept_request(request))
    }

    /// Read the next complete message.
    pub fn read_message(&mut self) -> Result<Message> {
        block_on(self.inner.read_message())
    }

    /// Read the rest of the current message into `buffer`.
    pub fn read<B: DynamicBuffer + ?Sized>(&mut self, buffer: &mut B) -> Result<usize> {
        block_on(self.inner.read(buffer))
    }

    /// Read at most `limit` payload bytes (0 for no limit) into `buffer`.
    pub fn read_some<B: DynamicBuffer + ?Sized>(&mut self, buffer: &mut B, limit: usize) -> Result<usize> {
        block_on(self.inner.read_some(buffer, limit))
    }

    /// Send a complete message.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        block_on(self.inner.write(payload))
    }

    /// Send part of a message.
    pub fn write_frame(&mut self, payload: &[u8], fin: bool) -> Result<()> {
        block_on(self.inner.write_frame(payload, fin))
    }

    /// Send a message.
    pub fn send(&mut self, message: Message) -> Result<()> {
        block_on(self.inner.send(message))
    }

    /// Send a ping.
    pub fn ping(&mut self, payload: &[u8]) -> Result<()> {
        block_on(self.inner.ping(payload))
    }

    /// Send a pong.
    pub fn pong(&mut self, payload: &[u8]) -> Result<()> {
        block_on(self.inner.pong(payload))
    }

    /// Perform the closing handshake.
    pub fn close(&mut self, reason: Option<CloseFrame>) -> Result<()> {
        block_on(self.inner.close(reason))
    }
}

/// Accept a blocking stream as a server WebSocket.
#[cfg(feature = "handshake")]
pub fn accept<S: Read + Write + Shutdown + Unpin>(stream: S) -> Result<WebSocket<S>> {
    accept_header(stream, NoCallback)
}

/// Accept a blocking stream as a server WebSocket, with a header callback.
#[cfg(feature = "handshake")]
pub fn accept_header<S: Read + Write + Shutdown + Unpin, C: Callback>(stream: S, callback: C) -> Result<WebSocket<S>> {
    let mut ws = WebSocket::new(stream, Role::Server);
    ws.accept_with(callback)?;
    Ok(ws)
}

/// Open a client WebSocket over a connected blocking stream.
#[cfg(feature = "handshake")]
pub fn client<S: Read + Write + Shutdown + Unpin>(
    request: impl IntoClientRequest,
    stream: S,
) -> Result<(WebSocket<S>, Response)> {
    let mut ws = WebSocket::new(stream, Role::Client);
    let response = ws.handshake_request(request)?;
    Ok((ws, response))
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::{error::Error, protocol::frame::codec::CloseCode};

    /// Canned input, recorded output.
    #[derive(Debug, Default)]
    struct Script {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        shut: bool,
    }

    impl Script {
        fn new(input: &[u8]) -> Self {
            Script { input: Cursor::new(input.to_vec()), ..Default::default() }
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Script {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shutdown for Script {
        fn shutdown(&mut self) -> io::Result<()> {
            self.shut = true;
            Ok(())
        }
    }

    #[test]
    fn client_reads_then_echoes_close() {
        let mut input = vec![0x81, 0x05];
        input.extend_from_slice(b"Hello");
        input.extend_from_slice(&[0x88, 0x02, 0x03, 0xe8]);

        let mut ws = WebSocket::from_raw_socket(Script::new(&input), Role::Client, WebSocketConfig::default());
        assert_eq!(ws.read_message().unwrap(), Message::Text("Hello".into()));
        assert!(ws.got_text());
        assert!(matches!(ws.read_message(), Err(Error::Closed)));
        assert_eq!(ws.status(), Status::Closed);
        assert_eq!(ws.close_reason(), Some(CloseFrame::new(CloseCode::Normal)));

        let script = ws.into_inner();
        assert!(script.shut);
        // masked close echo: header, 4 byte key, 2 byte code
        assert_eq!(script.output.len(), 8);
        assert_eq!(&script.output[..2], &[0x88, 0x82]);
    }

    #[test]
    fn server_writes_unmasked() {
        let mut ws = WebSocket::from_raw_socket(Script::new(&[]), Role::Server, WebSocketConfig::default());
        ws.set_text(true);
        ws.write(b"hi").unwrap();
        ws.ping(b"p").unwrap();
        assert_eq!(ws.into_inner().output, [0x81, 0x02, b'h', b'i', 0x89, 0x01, b'p']);
    }

    #[cfg(feature = "handshake")]
    #[test]
    fn blocking_accept() {
        let request = b"GET /chat HTTP/1.1\r\n\
            Host: server.example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";

        let ws = accept(Script::new(request)).unwrap();
        assert_eq!(ws.status(), Status::Open);
        let out = String::from_utf8(ws.into_inner().output).unwrap();
        assert!(out.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(out.contains("sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }
}

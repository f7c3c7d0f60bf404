//! Closing handshakes, including closes racing reads on the same connection.

use std::{
    cell::Cell,
    io,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use surge_ws::{error::Error, CloseCode, CloseFrame, Role, Status, WebSocketConfig, WebSocketStream};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

/// A transport that counts how often it was shut down.
struct Counted {
    inner: DuplexStream,
    shutdowns: Rc<Cell<usize>>,
}

impl Counted {
    fn new(inner: DuplexStream) -> (Self, Rc<Cell<usize>>) {
        let shutdowns = Rc::new(Cell::new(0));
        (Counted { inner, shutdowns: shutdowns.clone() }, shutdowns)
    }
}

impl AsyncRead for Counted {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Counted {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.set(self.shutdowns.get() + 1);
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

fn pair() -> (WebSocketStream<Counted>, Rc<Cell<usize>>, WebSocketStream<Counted>, Rc<Cell<usize>>) {
    let (a, b) = duplex(4096);
    let (a, client_shut) = Counted::new(a);
    let (b, server_shut) = Counted::new(b);
    (
        WebSocketStream::from_raw_socket(a, Role::Client, WebSocketConfig::default()),
        client_shut,
        WebSocketStream::from_raw_socket(b, Role::Server, WebSocketConfig::default()),
        server_shut,
    )
}

#[tokio::test]
async fn both_sides_close_at_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (client, client_shut, server, server_shut) = pair();

    let (c, s) = tokio::join!(
        client.close(Some(CloseFrame::new(CloseCode::Away))),
        server.close(Some(CloseFrame::new(CloseCode::Normal).with_reason("bye"))),
    );
    c.unwrap();
    s.unwrap();

    assert_eq!(client.status(), Status::Closed);
    assert_eq!(server.status(), Status::Closed);
    assert_eq!(client.close_reason(), Some(CloseFrame::new(CloseCode::Normal).with_reason("bye")));
    assert_eq!(server.close_reason(), Some(CloseFrame::new(CloseCode::Away)));
    assert_eq!(client_shut.get(), 1);
    assert_eq!(server_shut.get(), 1);
}

#[tokio::test]
async fn peer_close_is_echoed_by_read() {
    let (client, client_shut, server, server_shut) = pair();

    let (closed, read) = tokio::join!(client.close(None), server.read_message());
    closed.unwrap();
    assert!(matches!(read, Err(Error::Closed)));

    // no code received, so the echo carries 1000
    assert_eq!(client.close_reason(), Some(CloseFrame::new(CloseCode::Normal)));
    assert_eq!(server.close_reason(), None);
    assert_eq!(server.status(), Status::Closed);
    assert_eq!(client_shut.get(), 1);
    assert_eq!(server_shut.get(), 1);

    assert!(matches!(server.read_message().await, Err(Error::Closed)));
    assert!(matches!(server.write(b"late").await, Err(Error::OperationAborted)));
}

#[tokio::test]
async fn close_queued_behind_pending_read() {
    let (client, _, server, server_shut) = pair();

    // The read is parked on the transport when the close is started. The
    // client's answer then completes the close; the read reports the end.
    let (read, closed, echoed) = tokio::join!(server.read_message(), server.close(None), client.read_message());
    assert!(matches!(read, Err(Error::Closed)));
    closed.unwrap();
    assert!(matches!(echoed, Err(Error::Closed)));

    assert_eq!(server.status(), Status::Closed);
    assert_eq!(client.status(), Status::Closed);
    assert_eq!(server_shut.get(), 1);
}

#[tokio::test]
async fn close_after_read_finished_handshake() {
    let (a, mut peer) = duplex(4096);
    let (a, shut) = Counted::new(a);
    let server = WebSocketStream::from_raw_socket(a, Role::Server, WebSocketConfig::default());

    // masked close 1001 "gone" is already waiting
    peer.write_all(&[0x88, 0x86, 0, 0, 0, 0, 0x03, 0xe9, b'g', b'o', b'n', b'e']).await.unwrap();

    let (read, closed) = tokio::join!(server.read_message(), server.close(None));
    assert!(matches!(read, Err(Error::Closed)));
    assert!(matches!(closed, Err(Error::OperationAborted)));
    assert_eq!(server.close_reason(), Some(CloseFrame::new(CloseCode::Away).with_reason("gone")));
    assert_eq!(shut.get(), 1);

    let mut echo = Vec::new();
    peer.read_to_end(&mut echo).await.unwrap();
    assert_eq!(echo, [0x88, 0x02, 0x03, 0xe9]);
}

#[tokio::test]
async fn data_in_flight_is_discarded_by_close() {
    let (client, _, server, _) = pair();

    client.write(b"unread").await.unwrap();
    client.ping(b"also unread").await.unwrap();

    // the server skips the message and the ping while waiting for the answer
    let (c, s) = tokio::join!(server.close(None), client.read_message());
    c.unwrap();
    assert!(matches!(s, Err(Error::Closed)));
    assert_eq!(server.status(), Status::Closed);
    assert_eq!(server.close_reason(), Some(CloseFrame::new(CloseCode::Normal)));
}

#[tokio::test]
async fn too_big_fails_before_last_fragment() {
    let (a, mut peer) = duplex(4096);
    let config = WebSocketConfig::default().read_message_max(10);
    let server = WebSocketStream::from_raw_socket(a, Role::Server, config);

    // first fragment (8 bytes), then only the header of a second 8 byte fragment
    let mut wire = vec![0x02, 0x88, 0, 0, 0, 0];
    wire.extend_from_slice(&[1; 8]);
    wire.extend_from_slice(&[0x80, 0x88, 0, 0, 0, 0]);
    peer.write_all(&wire).await.unwrap();

    let mut out = Vec::new();
    let res = server.read(&mut out).await;
    assert!(matches!(res, Err(Error::Protocol(surge_ws::error::ProtocolError::MessageTooBig))));
    assert_eq!(out, [1; 8]);
    assert_eq!(server.status(), Status::Failed);

    let mut close = Vec::new();
    peer.read_to_end(&mut close).await.unwrap();
    assert_eq!(close, [0x88, 0x02, 0x03, 0xf1]);
}

#[tokio::test]
async fn eof_without_close_fails_connection() {
    let (a, peer) = duplex(64);
    let server = WebSocketStream::from_raw_socket(a, Role::Server, WebSocketConfig::default());
    drop(peer);

    assert!(matches!(server.read_message().await, Err(Error::Io(_))));
    assert_eq!(server.status(), Status::Failed);
    assert!(matches!(server.read_message().await, Err(Error::OperationAborted)));
}

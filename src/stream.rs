//! Transport abstraction.
//!
//! The engine talks to any `AsyncRead + AsyncWrite + Unpin` byte stream. Blocking
//! `std::io` streams are adapted by [`BlockingStream`] so that the synchronous
//! surface runs the very same engine.

use std::{
    cell::RefCell,
    future::poll_fn,
    io::{self, Read, Write},
    net::TcpStream,
    pin::Pin,
    task::{Context, Poll},
};

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::protocol::state::Role;

/// A byte stream a WebSocket can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin + ?Sized> Transport for T {}

/// Shut down the write half of a blocking stream.
pub trait Shutdown {
    /// Signal end of stream to the peer.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Shutdown for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, std::net::Shutdown::Write)
    }
}

/// Whether an error from a teardown only says that the peer is already gone.
fn is_clean_eof(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected)
}

/// Orderly shutdown of the transport after the closing handshake.
///
/// The write half is shut down first. A client then waits for the server to
/// close the connection, discarding anything still in flight, since the server
/// is the side expected to close TCP first. A clean end of stream is success.
pub(crate) async fn teardown<T: Transport>(role: Role, io: &RefCell<T>) -> io::Result<()> {
    debug!("{role} tearing down transport");

    match poll_fn(|cx| Pin::new(&mut *io.borrow_mut()).poll_shutdown(cx)).await {
        Err(e) if !is_clean_eof(&e) => return Err(e),
        _ => (),
    }

    if role == Role::Client {
        let mut scratch = [0u8; 512];
        loop {
            let res = poll_fn(|cx| {
                let mut buf = ReadBuf::new(&mut scratch);
                match Pin::new(&mut *io.borrow_mut()).poll_read(cx, &mut buf) {
                    Poll::Ready(Ok(())) => Poll::Ready(Ok(buf.filled().len())),
                    Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                    Poll::Pending => Poll::Pending,
                }
            })
            .await;

            match res {
                Ok(0) => break,
                Ok(n) => trace!("discarded {n} bytes during teardown"),
                Err(e) if is_clean_eof(&e) => break,
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

/// Runs a blocking stream behind the async transport traits.
///
/// Every poll performs the blocking call and is always ready. This is only
/// meant to be driven by `futures::executor::block_on`; a non-blocking stream
/// reporting `WouldBlock` surfaces that as an error.
#[derive(Debug)]
pub struct BlockingStream<S> {
    inner: S,
}

impl<S> BlockingStream<S> {
    /// Wrap a blocking stream
    pub fn new(inner: S) -> Self {
        BlockingStream { inner }
    }

    /// Returns a shared reference to the inner stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Returns the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read + Unpin> AsyncRead for BlockingStream<S> {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let n = this.inner.read(buf.initialize_unfilled())?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl<S: Write + Shutdown + Unpin> AsyncWrite for BlockingStream<S> {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(self.get_mut().inner.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.get_mut().inner.flush())
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.inner.flush()?;
        Poll::Ready(this.inner.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[derive(Default)]
    struct Pipe {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        shut: bool,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            std::io::Read::read(&mut self.input, buf)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            std::io::Write::write(&mut self.output, buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shutdown for Pipe {
        fn shutdown(&mut self) -> io::Result<()> {
            self.shut = true;
            Ok(())
        }
    }

    #[test]
    fn blocking_stream_is_always_ready() {
        let pipe = Pipe { input: Cursor::new(b"abc".to_vec()), ..Default::default() };
        let mut stream = BlockingStream::new(pipe);
        futures::executor::block_on(async {
            let mut buf = [0u8; 8];
            assert_eq!(stream.read(&mut buf).await.unwrap(), 3);
            stream.write_all(b"xyz").await.unwrap();
            stream.shutdown().await.unwrap();
        });
        let pipe = stream.into_inner();
        assert_eq!(pipe.output, b"xyz");
        assert!(pipe.shut);
    }

    #[tokio::test]
    async fn client_teardown_waits_for_server_eof() {
        let (client, mut server) = duplex(64);
        let client = RefCell::new(client);

        let peer = async {
            let mut buf = Vec::new();
            // sees our shutdown as EOF
            server.read_to_end(&mut buf).await.unwrap();
            server.write_all(b"late bytes").await.unwrap();
            server.shutdown().await.unwrap();
        };

        let (res, ()) = tokio::join!(teardown(Role::Client, &client), peer);
        res.unwrap();
    }
}

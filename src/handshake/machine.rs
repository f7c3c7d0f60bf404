//! Reading the HTTP head of the upgrade exchange

use std::io;

use log::trace;

use crate::{
    buffer::FlatBuffer,
    error::{Error, HandshakeError, Result},
    protocol::websocket::WebSocketStream,
    stream::Transport,
};

/// A parse-able object
pub trait TryParse: Sized {
    /// Returns Ok(None) if incomplete, Err on syntax errors
    fn try_parse(data: &[u8]) -> Result<Option<(usize, Self)>>;
}

/// Attack mitigation against DoS attacks
#[derive(Debug, Default)]
pub(crate) struct AttackCheck {
    /// Number of HTTP header successful reads (TCP packets)
    packets: usize,
    /// Total number of bytes in HTTP header
    bytes: usize,
}

impl AttackCheck {
    /// Check the size of an incoming packet. To be called immediately after a read
    /// passing its returned bytes count as `size`
    pub(crate) fn check_incoming_packet(&mut self, size: usize) -> Result<()> {
        self.packets += 1;
        self.bytes += size;

        const MAX_BYTES: usize = 65536;
        const MAX_PACKETS: usize = 512;
        const MIN_PACKET_SIZE: usize = 128;
        const MIN_PACKET_CHECK_THRESHOLD: usize = 64;

        if self.bytes > MAX_BYTES
            || self.packets > MAX_PACKETS
            || (self.packets > MIN_PACKET_CHECK_THRESHOLD && self.packets * MIN_PACKET_SIZE > self.bytes)
        {
            return Err(HandshakeError::AttackAttempt.into());
        }

        Ok(())
    }
}

impl<T: Transport> WebSocketStream<T> {
    /// Read until `buf` starts with a complete `O`, then consume and return it.
    ///
    /// Bytes past the head stay in `buf`.
    pub(crate) async fn read_head<O: TryParse>(&self, buf: &mut FlatBuffer) -> Result<O> {
        let mut check = AttackCheck::default();
        loop {
            if let Some((size, obj)) = O::try_parse(buf.data())? {
                trace!("parsed HTTP head of {size} bytes");
                buf.consume(size);
                return Ok(obj);
            }

            match self.fill(buf).await {
                Ok(n) => check.check_incoming_packet(n)?,
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(HandshakeError::IncompleteHandshake.into())
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncWriteExt};

    use super::*;
    use crate::{handshake::server::Request, protocol::state::Role};

    #[test]
    fn slow_drip_is_an_attack() {
        let mut check = AttackCheck::default();
        for _ in 0..64 {
            check.check_incoming_packet(1).unwrap();
        }
        assert!(matches!(
            check.check_incoming_packet(1),
            Err(Error::Handshake(HandshakeError::AttackAttempt))
        ));
    }

    #[tokio::test]
    async fn head_split_across_reads() {
        let (a, mut peer) = duplex(1024);
        let ws = WebSocketStream::new(a, Role::Server);
        let mut buf = FlatBuffer::with_max_size(4096);

        let peer = async {
            peer.write_all(b"GET /chat HTTP/1.1\r\nHost: exa").await.unwrap();
            tokio::task::yield_now().await;
            peer.write_all(b"mple.com\r\n\r\nextra").await.unwrap();
        };
        let (req, ()) = tokio::join!(ws.read_head::<Request>(&mut buf), peer);
        let req = req.unwrap();
        assert_eq!(req.uri().path(), "/chat");
        assert_eq!(req.headers()["Host"], "example.com");
        assert_eq!(buf.data(), b"extra");
    }

    #[tokio::test]
    async fn eof_mid_head_is_incomplete() {
        let (a, mut peer) = duplex(1024);
        let ws = WebSocketStream::new(a, Role::Server);
        let mut buf = FlatBuffer::with_max_size(4096);

        peer.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        drop(peer);
        assert!(matches!(
            ws.read_head::<Request>(&mut buf).await,
            Err(Error::Handshake(HandshakeError::IncompleteHandshake))
        ));
    }
}

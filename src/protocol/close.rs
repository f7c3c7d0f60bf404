//! Active close.
//!
//! The closing handshake owns both directions: the write lock first, then the
//! read lock. A read that meets the peer's close frame first completes the
//! handshake itself; the close operation then only reports the outcome.

use log::{debug, trace};

use crate::{
    error::{Error, Result},
    protocol::{
        frame::{codec::OpCode, mask::Masker, CloseFrame, Frame, FrameHeader},
        state::Status,
        websocket::{Incoming, ReadState, WebSocketStream},
    },
    stream::Transport,
};

impl<T: Transport> WebSocketStream<T> {
    /// Start the closing handshake and wait for it to finish.
    ///
    /// Sends a close frame (with `reason` if given), discards incoming data
    /// until the peer's close frame arrives, then tears the transport down.
    ///
    /// Returns [`Error::OperationAborted`] when the connection was not open. If
    /// a concurrent read finished the closing handshake first, the close
    /// succeeds without touching the transport again.
    ///
    /// Reasons longer than 123 bytes are truncated. A code that may not be sent,
    /// such as [`CloseCode::Status`](crate::protocol::frame::codec::CloseCode::Status),
    /// fails with [`ProtocolError::BadCloseCode`](crate::error::ProtocolError::BadCloseCode)
    /// before anything is written.
    pub async fn close(&self, reason: Option<CloseFrame>) -> Result<()> {
        let reason = reason.map(CloseFrame::into_outgoing).transpose()?;
        if matches!(self.status(), Status::Handshake) || self.status().is_terminal() {
            return Err(Error::OperationAborted);
        }

        let wr = self.wr.lock().await;
        if let Some(done) = self.closed_while_queued() {
            return done;
        }

        let send = {
            let mut state = self.state.borrow_mut();
            state.transition(Status::Closing);
            !std::mem::replace(&mut state.wr_close, true)
        };

        if send {
            let mut frame = Vec::new();
            Frame::new_close(reason.as_ref()).into_buf(self.role(), &mut frame);
            debug!("sending close frame {reason:?}");
            if let Err(e) = self.write_all(&frame).await {
                return Err(self.io_failed(e));
            }
        }

        let mut drained = Ok(());
        let mut rd_guard = None;
        if !self.state.borrow().rd_close {
            let mut rd = self.rd.lock().await;
            if let Some(done) = self.closed_while_queued() {
                return done;
            }
            if !self.state.borrow().rd_close {
                drained = self.drain(&mut rd).await;
            }
            rd_guard = Some(rd);
        } else {
            trace!("peer close already read, skipping drain");
        }

        let result = match drained {
            Err(e @ Error::Io(_)) => Err(e),
            drained => {
                let torn = self.teardown().await;
                drained.and(torn)
            }
        };

        self.state.borrow_mut().finish(result.is_ok());
        self.message.borrow_mut().reset();
        drop(wr);
        drop(rd_guard);
        result
    }

    /// Outcome for a close that waited while another operation ended the connection.
    fn closed_while_queued(&self) -> Option<Result<()>> {
        match self.status() {
            Status::Closed => Some(Ok(())),
            Status::Failed => Some(Err(Error::OperationAborted)),
            _ => None,
        }
    }

    /// Discard incoming frames until the peer's close frame.
    async fn drain(&self, rd: &mut ReadState) -> Result<()> {
        loop {
            if let Some(frame) = rd.frame.as_mut() {
                let skip = frame.remaining.min(rd.buf.len() as u64);
                frame.remaining -= skip;
                frame.avail = 0;
                let left = frame.remaining;
                rd.buf.consume(skip as usize);
                if left == 0 {
                    rd.frame = None;
                } else {
                    self.fill(&mut rd.buf).await?;
                }
                continue;
            }

            let rules = self.header_rules(rd);
            let Some((header, consumed)) = FrameHeader::decode(rd.buf.data(), &rules)? else {
                self.fill(&mut rd.buf).await?;
                continue;
            };
            rd.buf.consume(consumed);

            match header.opcode {
                OpCode::Close => {
                    let len = header.len as usize;
                    let mut payload = rd.buf.data()[..len].to_vec();
                    rd.buf.consume(len);
                    Masker::new(header.mask).apply(&mut payload);

                    let close = CloseFrame::parse(&payload)?;
                    debug!("peer answered close: {close:?}");
                    let mut state = self.state.borrow_mut();
                    state.rd_close = true;
                    state.close_reason = close;
                    return Ok(());
                }
                opcode if opcode.is_control() => {
                    trace!("discarding {opcode} while closing");
                    rd.buf.consume(header.len as usize);
                }
                _ => {
                    self.message.borrow_mut().begin_frame(&header, 0)?;
                    trace!("discarding {} bytes of data while closing", header.len);
                    rd.frame = Some(Incoming { remaining: header.len, avail: 0, masker: Masker::new(None), fin: header.fin });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::protocol::{
        config::WebSocketConfig,
        frame::codec::CloseCode,
        state::Role,
    };

    #[tokio::test]
    async fn server_close_drains_data_until_close() {
        let (a, mut peer) = duplex(1 << 12);
        let ws = WebSocketStream::from_raw_socket(a, Role::Server, WebSocketConfig::default());

        let peer = async {
            let mut head = [0u8; 2];
            peer.read_exact(&mut head).await.unwrap();
            assert_eq!(head, [0x88, 0x00]);
            // unread data, then the answer: masked close 1000
            peer.write_all(&[0x82, 0x83, 0, 0, 0, 0, 1, 2, 3]).await.unwrap();
            peer.write_all(&[0x88, 0x82, 0, 0, 0, 0, 0x03, 0xe8]).await.unwrap();
            let mut rest = Vec::new();
            peer.read_to_end(&mut rest).await.unwrap();
            assert!(rest.is_empty());
        };

        let (res, ()) = tokio::join!(ws.close(None), peer);
        res.unwrap();
        assert_eq!(ws.status(), Status::Closed);
        assert_eq!(ws.close_reason(), Some(CloseFrame::new(CloseCode::Normal)));
        assert!(matches!(ws.write(b"late").await, Err(Error::OperationAborted)));
        assert!(matches!(ws.close(None).await, Err(Error::OperationAborted)));
        assert!(matches!(ws.read(&mut Vec::new()).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn close_fails_on_protocol_error_while_draining() {
        let (a, mut peer) = duplex(1 << 12);
        let ws = WebSocketStream::from_raw_socket(a, Role::Server, WebSocketConfig::default());

        let peer = async {
            let mut head = [0u8; 4];
            peer.read_exact(&mut head).await.unwrap();
            // unmasked frame from a client
            peer.write_all(&[0x82, 0x00]).await.unwrap();
        };

        let (res, ()) = tokio::join!(ws.close(Some(CloseFrame::new(CloseCode::Away))), peer);
        assert!(matches!(res, Err(Error::Protocol(crate::error::ProtocolError::BadUnmaskedFrame))));
        assert_eq!(ws.status(), Status::Failed);
    }

    #[tokio::test]
    async fn outgoing_close_frame_is_checked_before_sending() {
        let (a, mut peer) = duplex(1 << 12);
        let ws = WebSocketStream::from_raw_socket(a, Role::Server, WebSocketConfig::default());

        let res = ws.close(Some(CloseFrame::new(CloseCode::Status))).await;
        assert!(matches!(res, Err(Error::Protocol(crate::error::ProtocolError::BadCloseCode(1005)))));
        assert_eq!(ws.status(), Status::Open);

        let long = CloseFrame { code: CloseCode::Normal, reason: "x".repeat(200) };
        let peer = async {
            let mut head = [0u8; 4];
            peer.read_exact(&mut head).await.unwrap();
            assert_eq!(head, [0x88, 125, 0x03, 0xe8]);
            let mut reason = [0u8; 123];
            peer.read_exact(&mut reason).await.unwrap();
            assert_eq!(reason, [b'x'; 123]);
            peer.write_all(&[0x88, 0x82, 0, 0, 0, 0, 0x03, 0xe8]).await.unwrap();
        };

        let (res, ()) = tokio::join!(ws.close(Some(long)), peer);
        res.unwrap();
        assert_eq!(ws.status(), Status::Closed);
    }

    #[tokio::test]
    async fn close_reports_transport_failure() {
        let (a, peer) = duplex(64);
        let ws = WebSocketStream::from_raw_socket(a, Role::Client, WebSocketConfig::default());
        drop(peer);

        assert!(matches!(ws.close(None).await, Err(Error::Io(_))));
        assert_eq!(ws.status(), Status::Failed);
    }
}

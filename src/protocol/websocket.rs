//! WebSocket connection engine

use std::{
    cell::{Cell, RefCell},
    future::poll_fn,
    io,
    pin::Pin,
    task::Poll,
};

use log::{debug, trace, warn};
use tokio::io::ReadBuf;

use crate::{
    buffer::{DynamicBuffer, FlatBuffer},
    error::{CapacityError, Error, ProtocolError, Result},
    protocol::{
        compression::{DeflateConfig, DeflateContext, DeflateParams, Deflater, Inflater},
        config::WebSocketConfig,
        frame::{
            codec::{CloseCode, FrameType, OpCode},
            mask::Masker,
            encode_control, CloseFrame, Frame, FrameHeader, HeaderRules, Utf8Checker,
        },
        lock::{OpGuard, OpLock},
        message::{Message, MessageState},
        state::{ConnectionState, Role, Status},
    },
    stream::{teardown, Transport},
    MAX_CONTROL_FRAME_PAYLOAD,
};

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 4096;

type ControlCallback = Box<dyn FnMut(FrameType, &[u8])>;

/// A data frame whose payload is being read.
#[derive(Debug)]
pub(crate) struct Incoming {
    /// Payload bytes not yet consumed from the buffer or the transport.
    pub(crate) remaining: u64,
    /// Payload bytes at the head of the read buffer that are already unmasked.
    pub(crate) avail: usize,
    pub(crate) masker: Masker,
    pub(crate) fin: bool,
}

/// Everything owned by the read direction.
#[derive(Debug)]
pub(crate) struct ReadState {
    pub(crate) buf: FlatBuffer,
    pub(crate) frame: Option<Incoming>,
    utf8: Utf8Checker,
    pub(crate) inflater: Option<Inflater>,
}

/// Everything owned by the write direction.
#[derive(Debug)]
pub(crate) struct WriteState {
    buf: Vec<u8>,
    /// A message was started with a non-final frame.
    continuing: bool,
    /// The message being written is compressed.
    compressing: bool,
    pub(crate) deflater: Option<Deflater>,
    threshold: usize,
}

/// A WebSocket connection over an asynchronous transport.
///
/// All operations take `&self`: a read, a write, a ping and a close may be in
/// flight at the same time on one task (for example with `tokio::join!`).
/// At most one operation owns each direction at a time; the others queue up
/// in arrival order. The type is not `Sync`.
///
/// A connection created with [`new`](Self::new) starts in
/// [`Status::Handshake`] and must be upgraded with
/// [`handshake`](Self::handshake) or [`accept`](Self::accept) first.
pub struct WebSocketStream<T> {
    pub(crate) transport: RefCell<T>,
    pub(crate) state: RefCell<ConnectionState>,
    pub(crate) message: RefCell<MessageState>,
    pub(crate) config: WebSocketConfig,
    pub(crate) rd: OpLock<ReadState>,
    pub(crate) wr: OpLock<WriteState>,
    text: Cell<bool>,
    callback: RefCell<Option<ControlCallback>>,
}

impl<T> std::fmt::Debug for WebSocketStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketStream")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T> WebSocketStream<T> {
    /// A connection that still needs its upgrade handshake.
    pub fn new(transport: T, role: Role) -> Self {
        Self::with_config(transport, role, WebSocketConfig::default())
    }

    /// Like [`new`](Self::new) with a custom configuration.
    pub fn with_config(transport: T, role: Role, config: WebSocketConfig) -> Self {
        Self::build(transport, role, Status::Handshake, config, Vec::new())
    }

    /// Wrap a transport on which the upgrade already happened elsewhere.
    pub fn from_raw_socket(transport: T, role: Role, config: WebSocketConfig) -> Self {
        Self::from_partially_read(transport, Vec::new(), role, config)
    }

    /// Like [`from_raw_socket`](Self::from_raw_socket), where `part` holds bytes
    /// that were read from the transport past the end of the HTTP head.
    pub fn from_partially_read(transport: T, part: Vec<u8>, role: Role, config: WebSocketConfig) -> Self {
        Self::build(transport, role, Status::Open, config, part)
    }

    fn build(transport: T, role: Role, status: Status, config: WebSocketConfig, part: Vec<u8>) -> Self {
        let mut buf = FlatBuffer::with_max_size(config.read_buffer_max.max(crate::MIN_READ_BUFFER).max(part.len()));
        // Capacity covers `part`.
        let _ = DynamicBuffer::extend(&mut buf, &part);

        WebSocketStream {
            transport: RefCell::new(transport),
            state: RefCell::new(ConnectionState::new(role, status)),
            message: RefCell::new(MessageState::default()),
            config,
            rd: OpLock::new("read", ReadState { buf, frame: None, utf8: Utf8Checker::default(), inflater: None }),
            wr: OpLock::new(
                "write",
                WriteState {
                    buf: Vec::with_capacity(config.write_buffer_size + FrameHeader::MAX_HEADER_SIZE),
                    continuing: false,
                    compressing: false,
                    deflater: None,
                    threshold: 0,
                },
            ),
            text: Cell::new(false),
            callback: RefCell::new(None),
        }
    }

    /// The configuration this connection runs with.
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Our side of the connection.
    pub fn role(&self) -> Role {
        self.state.borrow().role()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.state.borrow().status()
    }

    /// The code and reason from the peer's close frame, once one was received.
    pub fn close_reason(&self) -> Option<CloseFrame> {
        self.state.borrow().close_reason.clone()
    }

    /// Choose the type of the next outgoing message: text when `true`, binary otherwise.
    ///
    /// Takes effect at the start of the next message; a message already started
    /// with a non-final frame keeps its type.
    pub fn set_text(&self, text: bool) {
        self.text.set(text);
    }

    /// Whether outgoing messages are sent as text.
    pub fn text(&self) -> bool {
        self.text.get()
    }

    /// The message being read (or the last one read) is text.
    pub fn got_text(&self) -> bool {
        self.message.borrow().is_text()
    }

    /// The message being read (or the last one read) is binary.
    pub fn got_binary(&self) -> bool {
        self.message.borrow().is_binary()
    }

    /// The last read delivered the final bytes of a message.
    pub fn is_message_done(&self) -> bool {
        self.message.borrow().is_done()
    }

    /// Install a callback invoked for every ping, pong and close frame received
    /// while reading. Pings are answered automatically whether or not a
    /// callback is set.
    pub fn set_control_callback(&self, callback: impl FnMut(FrameType, &[u8]) + 'static) {
        *self.callback.borrow_mut() = Some(Box::new(callback));
    }

    /// Remove the control callback.
    pub fn clear_control_callback(&self) {
        self.callback.borrow_mut().take();
    }

    /// Take the transport back. Unread buffered bytes are discarded.
    pub fn into_inner(self) -> T {
        self.transport.into_inner()
    }

    /// Reach the transport.
    ///
    /// # Panics
    /// When called from inside an operation on this connection.
    pub fn with_transport<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.transport.borrow())
    }

    fn invoke_callback(&self, kind: FrameType, payload: &[u8]) {
        // Taken out for the call so the callback may replace itself.
        let cb = self.callback.borrow_mut().take();
        if let Some(mut cb) = cb {
            cb(kind, payload);
            let mut slot = self.callback.borrow_mut();
            if slot.is_none() {
                *slot = Some(cb);
            }
        }
    }

    /// The result handed to an operation that finds the connection already over.
    pub(crate) fn terminal_error(&self) -> Option<Error> {
        match self.status() {
            Status::Closed => Some(Error::Closed),
            Status::Failed => Some(Error::OperationAborted),
            _ => None,
        }
    }

    fn check_readable(&self) -> Result<()> {
        match self.status() {
            Status::Open | Status::Closing => Ok(()),
            Status::Closed => Err(Error::Closed),
            Status::Handshake | Status::Failed => Err(Error::OperationAborted),
        }
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.status() != Status::Open {
            return Err(Error::OperationAborted);
        }
        Ok(())
    }

    /// A transport error ends the connection without further I/O.
    pub(crate) fn io_failed(&self, err: Error) -> Error {
        if matches!(err, Error::Io(_)) {
            debug!("transport error: {err}");
            self.state.borrow_mut().transition(Status::Failed);
        }
        err
    }

    /// Install the negotiated permessage-deflate codec.
    ///
    /// Only called while both directions are held during the handshake.
    pub(crate) fn enable_deflate(
        &self,
        rd: &mut ReadState,
        wr: &mut WriteState,
        params: DeflateParams,
        config: &DeflateConfig,
    ) {
        let ctx = DeflateContext::new(self.role(), params, config);
        rd.inflater = Some(ctx.inflater);
        wr.deflater = Some(ctx.deflater);
        wr.threshold = ctx.threshold;
    }
}

impl<T: Transport> WebSocketStream<T> {
    /// Read from the transport into the tail of `buf`.
    ///
    /// End of stream is an error: the peer went away without a closing handshake.
    pub(crate) async fn fill(&self, buf: &mut FlatBuffer) -> Result<usize> {
        let region = buf.prepare(READ_CHUNK)?;
        let len = region.len();

        let res = poll_fn(|cx| {
            let mut rb = ReadBuf::new(&mut region[..]);
            match Pin::new(&mut *self.transport.borrow_mut()).poll_read(cx, &mut rb) {
                Poll::Ready(Ok(())) => Poll::Ready(Ok(rb.filled().len())),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Pending,
            }
        })
        .await;

        let n = *res.as_ref().unwrap_or(&0);
        buf.commit(len, n);
        match res {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => {
                trace!("read {n} bytes from transport");
                Ok(n)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write all of `data` and flush.
    pub(crate) async fn write_all(&self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = poll_fn(|cx| Pin::new(&mut *self.transport.borrow_mut()).poll_write(cx, data)).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            data = &data[n..];
        }
        poll_fn(|cx| Pin::new(&mut *self.transport.borrow_mut()).poll_flush(cx)).await?;
        Ok(())
    }

    pub(crate) async fn teardown(&self) -> Result<()> {
        Ok(teardown(self.role(), &self.transport).await?)
    }

    pub(crate) fn header_rules(&self, rd: &ReadState) -> HeaderRules {
        HeaderRules {
            role: self.role(),
            continuation_expected: self.message.borrow().continuation_expected(),
            deflate: rd.inflater.is_some(),
        }
    }

    /// Read the next complete message.
    pub async fn read_message(&self) -> Result<Message> {
        let mut data = Vec::new();
        self.read(&mut data).await?;
        if self.got_text() {
            Ok(Message::Text(String::from_utf8(data)?))
        } else {
            Ok(Message::Binary(data))
        }
    }

    /// Read the rest of the current message, or the whole next one, into `buffer`.
    ///
    /// Returns the number of bytes appended. Control frames met on the way are
    /// handled: pings are answered, and a close from the peer completes the
    /// closing handshake and ends the read with [`Error::Closed`].
    pub async fn read<B: DynamicBuffer + ?Sized>(&self, buffer: &mut B) -> Result<usize> {
        let mut total = 0;
        loop {
            total += self.read_some(buffer, 0).await?;
            if self.is_message_done() {
                return Ok(total);
            }
        }
    }

    /// Read some message bytes into `buffer`, at most `limit` bytes of frame
    /// payload (0 for no limit).
    ///
    /// Completes once at least one byte was delivered or the message ended.
    /// Check [`is_message_done`](Self::is_message_done) afterwards.
    pub async fn read_some<B: DynamicBuffer + ?Sized>(&self, buffer: &mut B, limit: usize) -> Result<usize> {
        self.check_readable()?;
        let rd = self.rd.lock().await;
        self.read_locked(rd, buffer, if limit == 0 { usize::MAX } else { limit }).await
    }

    async fn read_locked<'a, B: DynamicBuffer + ?Sized>(
        &'a self,
        mut rd: OpGuard<'a, ReadState>,
        out: &mut B,
        limit: usize,
    ) -> Result<usize> {
        let mut delivered = 0;

        loop {
            if let Some(e) = self.terminal_error() {
                return Err(e);
            }

            if let Some(frame) = &rd.frame {
                if frame.avail == 0 && frame.remaining > 0 {
                    if let Err(e) = self.fill_payload(&mut rd).await {
                        return Err(self.fail_read(rd, e).await);
                    }
                    continue;
                }

                let deflated = self.message.borrow().is_deflated();
                if !deflated && frame.avail > 0 && out.remaining() == 0 {
                    if delivered > 0 {
                        return Ok(delivered);
                    }
                    // The caller's buffer is full; the connection stays usable.
                    return Err(CapacityError::BufferOverflow { size: out.size() + 1, max: out.max_size() }.into());
                }

                match self.deliver(&mut rd, out, limit - delivered) {
                    Ok(n) => delivered += n,
                    Err(e) => return Err(self.fail_read(rd, e).await),
                }

                if self.is_message_done() && rd.frame.is_none() {
                    return Ok(delivered);
                }
                let drained = rd.frame.as_ref().map_or(true, |f| f.avail == 0);
                if delivered > 0 && (delivered >= limit || drained) {
                    return Ok(delivered);
                }
                continue;
            }

            let rules = self.header_rules(&rd);
            match FrameHeader::decode(rd.buf.data(), &rules) {
                Err(e) => return Err(self.fail_read(rd, e).await),
                Ok(None) => {
                    if let Err(e) = self.fill(&mut rd.buf).await {
                        return Err(self.fail_read(rd, e).await);
                    }
                    if self.rd.has_waiters() {
                        debug!("read yields to a queued operation");
                        drop(rd);
                        rd = self.rd.lock().await;
                    }
                }
                Ok(Some((header, consumed))) => {
                    rd.buf.consume(consumed);

                    if header.opcode.is_control() {
                        rd = self.on_control(rd, header).await?;
                        continue;
                    }

                    let begun = self.message.borrow_mut().begin_frame(&header, self.config.read_message_max);
                    if let Err(e) = begun {
                        return Err(self.fail_read(rd, e).await);
                    }
                    if header.opcode.is_data_start() {
                        rd.utf8.reset();
                    }

                    let mut masker = Masker::new(header.mask);
                    let avail = header.len.min(rd.buf.len() as u64) as usize;
                    masker.apply(&mut rd.buf.data_mut()[..avail]);
                    rd.frame = Some(Incoming { remaining: header.len, avail, masker, fin: header.fin });
                }
            }
        }
    }

    /// Pull more payload of the current frame into the (empty) read buffer.
    async fn fill_payload(&self, rd: &mut ReadState) -> Result<()> {
        debug_assert!(rd.buf.is_empty());
        self.fill(&mut rd.buf).await?;

        let ReadState { buf, frame, .. } = rd;
        if let Some(frame) = frame.as_mut() {
            let avail = frame.remaining.min(buf.len() as u64) as usize;
            frame.masker.apply(&mut buf.data_mut()[..avail]);
            frame.avail = avail;
        }
        Ok(())
    }

    /// Hand unmasked payload of the current frame to `out`.
    fn deliver<B: DynamicBuffer + ?Sized>(&self, rd: &mut ReadState, out: &mut B, max: usize) -> Result<usize> {
        let ReadState { buf, frame, utf8, inflater } = rd;
        let Some(incoming) = frame.as_mut() else { return Ok(0) };

        let mut msg = self.message.borrow_mut();
        let text = msg.is_text();
        let mut produced = 0;

        if msg.is_deflated() {
            let inflater = inflater.as_mut().ok_or(ProtocolError::BadReservedBits)?;
            let limit = self.config.read_message_max;
            let n = incoming.avail.min(max);
            let last = incoming.remaining == n as u64 && incoming.fin;

            let mut sink = |chunk: &[u8]| -> Result<()> {
                msg.add_inflated(chunk.len(), limit)?;
                if text && !utf8.write(chunk) {
                    return Err(ProtocolError::BadFramePayload.into());
                }
                out.extend(chunk)?;
                produced += chunk.len();
                Ok(())
            };
            inflater.decompress(&buf.data()[..n], &mut sink)?;
            if last {
                inflater.finish(&mut sink)?;
            }

            buf.consume(n);
            incoming.avail -= n;
            incoming.remaining -= n as u64;
        } else {
            let n = incoming.avail.min(max).min(out.remaining());
            let data = &buf.data()[..n];
            if text && !utf8.write(data) {
                return Err(ProtocolError::BadFramePayload.into());
            }
            out.extend(data)?;
            produced = n;

            buf.consume(n);
            incoming.avail -= n;
            incoming.remaining -= n as u64;
        }

        if incoming.remaining == 0 {
            let fin = incoming.fin;
            *frame = None;
            if fin {
                if text && !utf8.finish() {
                    return Err(ProtocolError::BadFramePayload.into());
                }
                msg.finish();
                trace!("message complete");
            }
        }

        Ok(produced)
    }

    /// Dispatch a control frame whose payload is buffered in full.
    ///
    /// Returns the read lock for the caller to continue with, or the error the
    /// read completes with.
    async fn on_control<'a>(&'a self, mut rd: OpGuard<'a, ReadState>, header: FrameHeader) -> Result<OpGuard<'a, ReadState>> {
        let len = header.len as usize;
        let mut payload = rd.buf.data()[..len].to_vec();
        rd.buf.consume(len);
        Masker::new(header.mask).apply(&mut payload);

        match header.opcode {
            OpCode::Ping => {
                if self.status() != Status::Open {
                    trace!("ignoring ping while closing");
                    return Ok(rd);
                }
                self.invoke_callback(FrameType::Ping, &payload);

                // The pong goes through the write lock like any other write, in order.
                drop(rd);
                {
                    let mut wr = self.wr.lock().await;
                    if self.status() == Status::Open {
                        wr.buf.clear();
                        Frame::new_pong(payload).into_buf(self.role(), &mut wr.buf);
                        if let Err(e) = self.write_all(&wr.buf).await {
                            return Err(self.io_failed(e));
                        }
                        trace!("answered ping");
                    }
                }
                Ok(self.rd.lock().await)
            }
            OpCode::Pong => {
                if self.status() == Status::Open {
                    self.invoke_callback(FrameType::Pong, &payload);
                }
                Ok(rd)
            }
            OpCode::Close => Err(self.on_peer_close(rd, payload).await),
            other => Err(self.fail_read(rd, ProtocolError::BadOpcode(other.into()).into()).await),
        }
    }

    /// The peer started (or answered) the closing handshake.
    async fn on_peer_close<'a>(&'a self, rd: OpGuard<'a, ReadState>, payload: Vec<u8>) -> Error {
        let close = match CloseFrame::parse(&payload) {
            Ok(close) => close,
            Err(e) => return self.fail_read(rd, e).await,
        };
        debug!("received close frame: {close:?}");

        let echo_done = {
            let mut state = self.state.borrow_mut();
            state.rd_close = true;
            state.close_reason = close.clone();
            state.transition(Status::Closing);
            state.wr_close
        };
        self.invoke_callback(FrameType::Close, &payload);

        if echo_done {
            // Our close already went out and its sender is queued on the read
            // lock while owning the write side, so nothing else can write.
            let res = self.teardown().await;
            self.state.borrow_mut().finish(res.is_ok());
            drop(rd);
            return res.err().unwrap_or(Error::Closed);
        }

        drop(rd);
        let mut wr = self.wr.lock().await;
        let rd = self.rd.lock().await;
        if let Some(e) = self.terminal_error() {
            return e;
        }

        let code = close.map(|c| c.code).unwrap_or(CloseCode::Normal);
        self.state.borrow_mut().wr_close = true;
        wr.buf.clear();
        Frame::new_close(Some(&CloseFrame::new(code))).into_buf(self.role(), &mut wr.buf);

        let res = match self.write_all(&wr.buf).await {
            Ok(()) => self.teardown().await,
            Err(e) => Err(e),
        };
        self.state.borrow_mut().finish(res.is_ok());
        drop(wr);
        drop(rd);
        res.err().unwrap_or(Error::Closed)
    }

    /// Fail the connection because of `err`, which the read then returns.
    ///
    /// A transport error ends the connection on the spot. A protocol error
    /// sends a close frame with a matching code first (best effort) and tears
    /// the transport down.
    async fn fail_read<'a>(&'a self, rd: OpGuard<'a, ReadState>, err: Error) -> Error {
        if matches!(err, Error::Io(_)) {
            return self.io_failed(err);
        }

        // Both directions are needed, taken in order: write then read.
        drop(rd);
        let mut wr = self.wr.lock().await;
        let rd = self.rd.lock().await;
        if self.status().is_terminal() {
            return err;
        }

        debug!("failing connection: {err}");
        let send_close = {
            let mut state = self.state.borrow_mut();
            state.transition(Status::Closing);
            !std::mem::replace(&mut state.wr_close, true)
        };

        if send_close {
            wr.buf.clear();
            Frame::new_close(Some(&CloseFrame::new(err.close_code()))).into_buf(self.role(), &mut wr.buf);
            if let Err(e) = self.write_all(&wr.buf).await {
                warn!("failed to send close frame: {e}");
            }
        }
        if let Err(e) = self.teardown().await {
            warn!("teardown after protocol error failed: {e}");
        }

        self.state.borrow_mut().transition(Status::Failed);
        self.message.borrow_mut().reset();
        drop(wr);
        drop(rd);
        err
    }

    /// Send `payload` as a complete message.
    pub async fn write(&self, payload: &[u8]) -> Result<()> {
        self.write_frame(payload, true).await
    }

    /// Send part of a message. `fin` marks the last part.
    ///
    /// The first call after a finished message decides its type (see
    /// [`set_text`](Self::set_text)); later calls send continuation frames.
    /// With auto-fragmentation each call may produce several frames.
    pub async fn write_frame(&self, payload: &[u8], fin: bool) -> Result<()> {
        self.check_writable()?;
        let mut wr = self.wr.lock().await;
        self.check_writable()?;

        let role = self.role();
        let WriteState { buf, continuing, compressing, deflater, threshold } = &mut *wr;

        let starting = !*continuing;
        let opcode = match (starting, self.text.get()) {
            (false, _) => OpCode::Continuation,
            (true, true) => OpCode::Text,
            (true, false) => OpCode::Binary,
        };

        if starting {
            *compressing = deflater.is_some() && !(fin && payload.len() < *threshold);
        }

        let compressed;
        let body = match deflater.as_mut() {
            Some(deflater) if *compressing => {
                let mut out = Vec::new();
                deflater.compress(payload, fin, &mut out)?;
                compressed = out;
                &compressed[..]
            }
            _ => payload,
        };

        let chunk = if self.config.auto_fragment { self.config.write_buffer_size.max(1) } else { usize::MAX };
        let mut chunks = body.chunks(chunk).peekable();
        let mut first = true;

        buf.clear();
        loop {
            let part = chunks.next().unwrap_or_default();
            let last = chunks.peek().is_none();
            let mut frame = Frame::new_data(bytes::Bytes::copy_from_slice(part), OpCode::Continuation, fin && last);
            let header = frame.header_mut();
            if first {
                header.opcode = opcode;
                header.rsv1 = starting && *compressing;
            }
            frame.into_buf(role, buf);
            trace!("queued {opcode} frame fin={} len={}", fin && last, part.len());
            first = false;
            if last {
                break;
            }
        }

        *continuing = !fin;
        let res = self.write_all(&buf[..]).await;
        res.map_err(|e| self.io_failed(e))
    }

    /// Send a message. Control messages map onto [`ping`](Self::ping),
    /// [`pong`](Self::pong) and [`close`](Self::close).
    pub async fn send(&self, message: Message) -> Result<()> {
        match message {
            Message::Text(text) => {
                self.set_text(true);
                self.write(text.as_bytes()).await
            }
            Message::Binary(data) => {
                self.set_text(false);
                self.write(&data).await
            }
            Message::Ping(data) => self.ping(&data).await,
            Message::Pong(data) => self.pong(&data).await,
            Message::Close(reason) => self.close(reason).await,
        }
    }

    /// Send a ping.
    pub async fn ping(&self, payload: &[u8]) -> Result<()> {
        self.write_control(OpCode::Ping, payload).await
    }

    /// Send an unsolicited pong.
    pub async fn pong(&self, payload: &[u8]) -> Result<()> {
        self.write_control(OpCode::Pong, payload).await
    }

    async fn write_control(&self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(ProtocolError::BadControlSize.into());
        }
        self.check_writable()?;
        let _wr = self.wr.lock().await;
        self.check_writable()?;

        let frame = encode_control(opcode, payload, self.role());
        self.write_all(&frame).await.map_err(|e| self.io_failed(e))
    }
}

//! permessage-deflate (RFC 7692)
//!
//! Negotiation works on raw `Sec-WebSocket-Extensions` values so it does not
//! depend on the HTTP types. The codec keeps one raw deflate stream per
//! direction; the LZ77 window is always 15 bits.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::{debug, trace};

use crate::{
    error::{HandshakeError, Result},
    protocol::state::Role,
};

/// Extension token.
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// Appended by the receiver before inflating, stripped by the sender after a sync flush.
const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

const MAX_WINDOW_BITS: u8 = 15;
const INFLATE_CHUNK: usize = 4096;

/// permessage-deflate settings for one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct DeflateConfig {
    /// Offer (client) or accept (server) the extension.
    pub enabled: bool,
    /// Ask that the client resets its compression context after every message.
    pub client_no_context_takeover: bool,
    /// Ask that the server resets its compression context after every message.
    pub server_no_context_takeover: bool,
    /// Compression level, 0 to 9.
    pub compression_level: u32,
    /// Messages shorter than this are sent uncompressed.
    pub msg_size_threshold: usize,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_no_context_takeover: false,
            server_no_context_takeover: false,
            compression_level: Compression::default().level(),
            msg_size_threshold: 0,
        }
    }
}

impl DeflateConfig {
    /// Enabled with default parameters.
    pub fn enabled() -> Self {
        Self { enabled: true, ..Self::default() }
    }
}

/// Parameters both sides agreed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeflateParams {
    /// The server resets its compressor after each message.
    pub server_no_context_takeover: bool,
    /// The client resets its compressor after each message.
    pub client_no_context_takeover: bool,
}

impl DeflateParams {
    /// Render as a `Sec-WebSocket-Extensions` response value.
    pub fn to_header(self) -> String {
        let mut out = String::from(PERMESSAGE_DEFLATE);
        if self.server_no_context_takeover {
            out.push_str("; server_no_context_takeover");
        }
        if self.client_no_context_takeover {
            out.push_str("; client_no_context_takeover");
        }
        out
    }
}

/// One extension from a header value: its token and `name[=value]` parameters.
type Extension<'a> = (&'a str, Vec<(&'a str, Option<&'a str>)>);

fn parse_extensions(value: &str) -> impl Iterator<Item = Extension<'_>> {
    value.split(',').filter(|e| !e.trim().is_empty()).map(|ext| {
        let mut parts = ext.split(';').map(str::trim);
        let name = parts.next().unwrap_or_default();
        let params = parts
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim().trim_matches('"'))),
                None => (p, None),
            })
            .collect();
        (name, params)
    })
}

fn window_bits(value: Option<&str>) -> Option<u8> {
    value?.parse::<u8>().ok().filter(|bits| (8..=MAX_WINDOW_BITS).contains(bits))
}

/// Build the client's offer.
pub fn offer(config: &DeflateConfig) -> String {
    let mut out = String::from(PERMESSAGE_DEFLATE);
    out.push_str("; client_max_window_bits");
    if config.server_no_context_takeover {
        out.push_str("; server_no_context_takeover");
    }
    if config.client_no_context_takeover {
        out.push_str("; client_no_context_takeover");
    }
    out
}

/// Pick the first acceptable offer from the client's `Sec-WebSocket-Extensions` values.
///
/// Offers with unknown or repeated parameters, and offers that restrict the
/// server's window below 15 bits, are skipped.
pub fn negotiate<'a>(config: &DeflateConfig, offers: impl IntoIterator<Item = &'a str>) -> Option<DeflateParams> {
    if !config.enabled {
        return None;
    }

    'offers: for (name, params) in offers.into_iter().flat_map(parse_extensions) {
        if !name.eq_ignore_ascii_case(PERMESSAGE_DEFLATE) {
            continue;
        }

        let mut agreed = DeflateParams {
            server_no_context_takeover: config.server_no_context_takeover,
            client_no_context_takeover: config.client_no_context_takeover,
        };
        let mut seen: Vec<&str> = Vec::new();

        for (key, value) in params {
            if seen.contains(&key) {
                continue 'offers;
            }
            seen.push(key);

            match key {
                "server_no_context_takeover" if value.is_none() => agreed.server_no_context_takeover = true,
                "client_no_context_takeover" if value.is_none() => agreed.client_no_context_takeover = true,
                "server_max_window_bits" => match window_bits(value) {
                    Some(MAX_WINDOW_BITS) => (),
                    _ => {
                        debug!("declining deflate offer restricting the server window");
                        continue 'offers;
                    }
                },
                "client_max_window_bits" => {
                    if value.is_some() && window_bits(value).is_none() {
                        continue 'offers;
                    }
                }
                _ => continue 'offers,
            }
        }

        debug!("accepted deflate offer: {agreed:?}");
        return Some(agreed);
    }

    None
}

/// Check the server's answer to our offer.
///
/// `None` when the server declined the extension.
pub fn verify_response<'a>(
    config: &DeflateConfig,
    values: impl IntoIterator<Item = &'a str>,
) -> Result<Option<DeflateParams>> {
    let mut agreed = None;

    for (name, params) in values.into_iter().flat_map(parse_extensions) {
        if !config.enabled || !name.eq_ignore_ascii_case(PERMESSAGE_DEFLATE) || agreed.is_some() {
            return Err(HandshakeError::BadExtension.into());
        }

        let mut result = DeflateParams::default();
        for (key, value) in params {
            match key {
                "server_no_context_takeover" if value.is_none() => result.server_no_context_takeover = true,
                "client_no_context_takeover" if value.is_none() => result.client_no_context_takeover = true,
                "server_max_window_bits" if window_bits(value).is_some() => (),
                "client_max_window_bits" if window_bits(value) == Some(MAX_WINDOW_BITS) => (),
                _ => return Err(HandshakeError::BadExtension.into()),
            }
        }

        if config.server_no_context_takeover && !result.server_no_context_takeover {
            return Err(HandshakeError::BadExtension.into());
        }
        agreed = Some(result);
    }

    Ok(agreed)
}

/// Outgoing half of the codec.
#[derive(Debug)]
pub(crate) struct Deflater {
    inner: Compress,
    reset: bool,
}

impl Deflater {
    pub(crate) fn new(level: u32, reset: bool) -> Self {
        Deflater { inner: Compress::new(Compression::new(level.min(9)), false), reset }
    }

    /// Compress one frame's worth of a message into `out`.
    ///
    /// The final frame is sync flushed and loses its trailing `00 00 ff ff`.
    pub(crate) fn compress(&mut self, mut input: &[u8], fin: bool, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let flush = if fin { FlushCompress::Sync } else { FlushCompress::None };

        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(input.len().max(256));
            }
            let before = self.inner.total_in();
            self.inner.compress_vec(input, out, flush)?;
            input = &input[(self.inner.total_in() - before) as usize..];

            if input.is_empty() && out.len() < out.capacity() {
                break;
            }
        }

        if fin {
            if out[start..].ends_with(&DEFLATE_TRAILER) {
                out.truncate(out.len() - DEFLATE_TRAILER.len());
            }
            if out.len() == start {
                out.push(0x00);
            }
            if self.reset {
                self.inner.reset();
            }
        }

        trace!("deflated frame to {} bytes", out.len() - start);
        Ok(())
    }
}

/// Incoming half of the codec.
#[derive(Debug)]
pub(crate) struct Inflater {
    inner: Decompress,
    reset: bool,
}

impl Inflater {
    pub(crate) fn new(reset: bool) -> Self {
        Inflater { inner: Decompress::new(false), reset }
    }

    /// Inflate `input`, handing output to `sink` in bounded chunks.
    ///
    /// `sink` may fail to stop inflating early, e.g. when the message grows too big.
    pub(crate) fn decompress(&mut self, mut input: &[u8], mut sink: impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        let mut chunk = Vec::with_capacity(INFLATE_CHUNK);

        loop {
            chunk.clear();
            let before = self.inner.total_in();
            let status = self.inner.decompress_vec(input, &mut chunk, FlushDecompress::Sync)?;
            let consumed = (self.inner.total_in() - before) as usize;
            input = &input[consumed..];

            if !chunk.is_empty() {
                sink(&chunk)?;
            }

            if status == Status::StreamEnd {
                self.inner.reset(false);
                if input.is_empty() {
                    return Ok(());
                }
                continue;
            }

            let full = chunk.len() == chunk.capacity();
            if (input.is_empty() && !full) || (consumed == 0 && chunk.is_empty()) {
                return Ok(());
            }
        }
    }

    /// The message ended: feed the stripped trailer.
    pub(crate) fn finish(&mut self, sink: impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        self.decompress(&DEFLATE_TRAILER, sink)?;
        if self.reset {
            self.inner.reset(false);
        }
        Ok(())
    }
}

/// Both halves, configured for our role.
#[derive(Debug)]
pub(crate) struct DeflateContext {
    pub(crate) deflater: Deflater,
    pub(crate) inflater: Inflater,
    pub(crate) threshold: usize,
}

impl DeflateContext {
    pub(crate) fn new(role: Role, params: DeflateParams, config: &DeflateConfig) -> Self {
        let (ours, theirs) = match role {
            Role::Client => (params.client_no_context_takeover, params.server_no_context_takeover),
            Role::Server => (params.server_no_context_takeover, params.client_no_context_takeover),
        };
        debug!("{role} deflate context: reset own={ours} reset peer={theirs}");
        DeflateContext {
            deflater: Deflater::new(config.compression_level, ours),
            inflater: Inflater::new(theirs),
            threshold: config.msg_size_threshold,
        }
    }
}

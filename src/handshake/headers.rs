//! HTTP Request and Response header handlers

use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::{parse_headers, Header, EMPTY_HEADER};

use crate::{error::Result, handshake::machine::TryParse};

/// Limit for the number of header lines
pub const MAX_HEADERS: usize = 124;

/// Trait to convert raw objects into HTTP parse-able objects
pub(crate) trait FromHttparse<T>: Sized {
    /// Convert raw object into HTTP headers
    fn from_httparse(raw: T) -> Result<Self>;
}

impl<'b: 'h, 'h> FromHttparse<&'b [Header<'h>]> for HeaderMap {
    fn from_httparse(raw: &'b [Header<'h>]) -> Result<Self> {
        let mut headers = HeaderMap::new();

        for h in raw {
            headers.append(HeaderName::from_bytes(h.name.as_bytes())?, HeaderValue::from_bytes(h.value)?);
        }

        Ok(headers)
    }
}

impl TryParse for HeaderMap {
    fn try_parse(data: &[u8]) -> Result<Option<(usize, Self)>> {
        let mut hbuffer = [EMPTY_HEADER; MAX_HEADERS];

        Ok(match parse_headers(data, &mut hbuffer)? {
            httparse::Status::Partial => None,
            httparse::Status::Complete((size, hdr)) => Some((size, HeaderMap::from_httparse(hdr)?)),
        })
    }
}

/// Whether any `name` header holds `token` in its comma separated list.
///
/// Tokens compare case-insensitively; a token merely containing `token`
/// does not match.
pub fn has_token(headers: &HeaderMap, name: impl http::header::AsHeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// All values of a header that are valid strings.
pub(crate) fn values<'a>(headers: &'a HeaderMap, name: &str) -> impl Iterator<Item = &'a str> {
    headers.get_all(name).into_iter().filter_map(|v| v.to_str().ok())
}

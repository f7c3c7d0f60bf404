//! Client side of the upgrade handshake

use std::io::Write;

use http::{
    header::{CONNECTION, HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE},
    HeaderMap, Method, Request as HttpRequest, Response as HttpResponse, StatusCode, Uri, Version,
};
use httparse::{Status as ParseStatus, EMPTY_HEADER};
use log::debug;

use crate::{
    error::{Error, HandshakeError, Result, UrlError},
    handshake::{
        core::{derive_accept_key, generate_key},
        headers::{has_token, values, FromHttparse, MAX_HEADERS},
        machine::TryParse,
    },
    protocol::{
        compression::{self, DeflateParams},
        state::{Role, Status},
        websocket::{ReadState, WebSocketStream, WriteState},
    },
    stream::Transport,
};

/// Client Request type
pub type Request = HttpRequest<()>;
/// Client Response Type
pub type Response = HttpResponse<Option<Vec<u8>>>;

/// Build the upgrade request for `target` on `host`, with a fresh key.
pub fn build_request(host: &str, target: &str) -> Result<Request> {
    Ok(Request::builder()
        .method(Method::GET)
        .uri(target)
        .version(Version::HTTP_11)
        .header(HOST, host)
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "websocket")
        .header(SEC_WEBSOCKET_VERSION, "13")
        .header(SEC_WEBSOCKET_KEY, generate_key())
        .body(())?)
}

/// Anything that can become a client upgrade request.
///
/// Implemented for complete requests, for `ws://` URIs given as [`Uri`] or
/// strings, and for [`url::Url`] with the `url` feature.
pub trait IntoClientRequest {
    /// Produce the request.
    fn into_client_request(self) -> Result<Request>;
}

impl IntoClientRequest for Request {
    fn into_client_request(self) -> Result<Request> {
        Ok(self)
    }
}

impl IntoClientRequest for Uri {
    fn into_client_request(self) -> Result<Request> {
        match self.scheme_str() {
            Some("ws") | Some("wss") => (),
            _ => return Err(UrlError::UnsupportedScheme.into()),
        }
        let authority = self.authority().ok_or(UrlError::MissingHost)?;
        let host = authority.host();
        if host.is_empty() {
            return Err(UrlError::MissingHost.into());
        }
        let target = self.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        build_request(authority.as_str(), target)
    }
}

impl<'a> IntoClientRequest for &'a str {
    fn into_client_request(self) -> Result<Request> {
        self.parse::<Uri>()?.into_client_request()
    }
}

impl IntoClientRequest for String {
    fn into_client_request(self) -> Result<Request> {
        self.as_str().into_client_request()
    }
}

#[cfg(feature = "url")]
impl IntoClientRequest for url::Url {
    fn into_client_request(self) -> Result<Request> {
        match self.scheme() {
            "ws" | "wss" => (),
            _ => return Err(UrlError::UnsupportedScheme.into()),
        }
        let host = self.host_str().ok_or(UrlError::MissingHost)?;
        let host = match self.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        let mut target = self.path().to_owned();
        if let Some(query) = self.query() {
            target.push('?');
            target.push_str(query);
        }
        build_request(&host, &target)
    }
}

/// Serializes a client upgrade request and extracts its `Sec-WebSocket-Key`.
pub fn generate_request(request: &Request) -> Result<(Vec<u8>, String)> {
    if request.method() != Method::GET {
        return Err(HandshakeError::BadMethod.into());
    }
    if request.version() < Version::HTTP_11 {
        return Err(HandshakeError::BadHttpVersion.into());
    }
    if !request.headers().contains_key(HOST) {
        return Err(HandshakeError::NoHost.into());
    }

    let key = request.headers().get(SEC_WEBSOCKET_KEY).ok_or(HandshakeError::NoSecKey)?.to_str()?.to_owned();

    let mut req = Vec::new();
    write!(
        req,
        "GET {path} {version:?}\r\n",
        path = request.uri().path_and_query().ok_or(Error::Url(UrlError::NoPathOrQuery))?.as_str(),
        version = Version::HTTP_11
    )?;

    for (k, v) in request.headers() {
        let value = v.to_str().map_err(|e| Error::Utf8(format!("{e} for header name '{k}' with value: {v:?}")))?;
        write!(req, "{}: {}\r\n", canonical_name(k.as_str()), value)?;
    }

    write!(req, "\r\n")?;
    Ok((req, key))
}

/// Restore the conventional spelling of the upgrade headers.
fn canonical_name(name: &str) -> &str {
    const NAMES: [&str; 8] = [
        "Host",
        "Connection",
        "Upgrade",
        "Origin",
        "Sec-WebSocket-Key",
        "Sec-WebSocket-Version",
        "Sec-WebSocket-Protocol",
        "Sec-WebSocket-Extensions",
    ];
    NAMES.iter().find(|n| n.eq_ignore_ascii_case(name)).copied().unwrap_or(name)
}

/// What the response must show for the request that was sent.
#[derive(Debug)]
struct VerifyData {
    accept_key: String,
}

impl VerifyData {
    fn verify_response(&self, res: &Response) -> Result<()> {
        if res.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(HandshakeError::BadStatus(res.status().as_u16()).into());
        }
        if res.version() != Version::HTTP_11 {
            return Err(HandshakeError::BadHttpVersion.into());
        }

        let headers = res.headers();
        if !has_token(headers, CONNECTION, "upgrade") {
            return Err(HandshakeError::NoConnection.into());
        }
        if !has_token(headers, UPGRADE, "websocket") {
            return Err(HandshakeError::NoUpgrade.into());
        }

        let accept = headers.get(SEC_WEBSOCKET_ACCEPT).ok_or(HandshakeError::NoSecAccept)?;
        if accept != self.accept_key.as_str() {
            return Err(HandshakeError::BadSecAccept.into());
        }

        Ok(())
    }
}

impl TryParse for Response {
    fn try_parse(data: &[u8]) -> Result<Option<(usize, Self)>> {
        let mut hbuffer = [EMPTY_HEADER; MAX_HEADERS];
        let mut res = httparse::Response::new(&mut hbuffer);

        Ok(match res.parse(data)? {
            ParseStatus::Partial => None,
            ParseStatus::Complete(n) => Some((n, Response::from_httparse(res)?)),
        })
    }
}

impl<'b: 'h, 'h> FromHttparse<httparse::Response<'h, 'b>> for Response {
    fn from_httparse(raw: httparse::Response<'h, 'b>) -> Result<Self> {
        let code = raw.code.ok_or(HandshakeError::Httparse(httparse::Error::Status))?;

        let mut res = Response::new(None);
        *res.status_mut() = StatusCode::from_u16(code)?;
        *res.headers_mut() = HeaderMap::from_httparse(raw.headers)?;
        *res.version_mut() = if raw.version == Some(1) { Version::HTTP_11 } else { Version::HTTP_10 };

        Ok(res)
    }
}

impl<T: Transport> WebSocketStream<T> {
    /// Perform the client handshake for `target` (for example `/chat`) on `host`.
    ///
    /// Returns the server's `101` response. Bytes the server sent after it
    /// stay buffered for the first read.
    pub async fn handshake(&self, host: &str, target: &str) -> Result<Response> {
        self.handshake_with(host, target, |_| ()).await
    }

    /// Like [`handshake`](Self::handshake), letting `decorate` add headers
    /// (for example `Origin` or `Sec-WebSocket-Protocol`) to the request first.
    pub async fn handshake_with(
        &self,
        host: &str,
        target: &str,
        decorate: impl FnOnce(&mut Request),
    ) -> Result<Response> {
        let mut request = build_request(host, target)?;
        decorate(&mut request);
        self.handshake_request(request).await
    }

    /// Perform the client handshake with a prepared request.
    ///
    /// The request must carry the upgrade headers, as made by [`build_request`].
    /// When compression is enabled and the request carries no
    /// `Sec-WebSocket-Extensions` header, the permessage-deflate offer is added.
    ///
    /// A response other than `101` fails with [`Error::Http`], with any body
    /// bytes that arrived with it attached.
    pub async fn handshake_request(&self, request: Request) -> Result<Response> {
        if self.role() != Role::Client || self.status() != Status::Handshake {
            return Err(Error::OperationAborted);
        }

        let mut wr = self.wr.lock().await;
        let mut rd = self.rd.lock().await;
        if self.status() != Status::Handshake {
            return Err(Error::OperationAborted);
        }

        let res = self.client_upgrade(&mut rd, &mut wr, request).await;
        match &res {
            Ok(_) => self.state.borrow_mut().transition(Status::Open),
            Err(e) => {
                debug!("client handshake failed: {e}");
                self.state.borrow_mut().transition(Status::Failed);
            }
        }
        drop(wr);
        drop(rd);
        res
    }

    async fn client_upgrade(&self, rd: &mut ReadState, wr: &mut WriteState, mut request: Request) -> Result<Response> {
        let deflate = self.config.compression;
        if deflate.enabled && !request.headers().contains_key(SEC_WEBSOCKET_EXTENSIONS) {
            request.headers_mut().insert(SEC_WEBSOCKET_EXTENSIONS, compression::offer(&deflate).parse()?);
        }

        let (head, key) = generate_request(&request)?;
        let verify = VerifyData { accept_key: derive_accept_key(key.as_bytes()) };
        debug!("client sending upgrade request for {}", request.uri());
        self.write_all(&head).await?;

        let mut response: Response = self.read_head(&mut rd.buf).await?;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            debug!("upgrade declined with {}", response.status());
            *response.body_mut() = Some(rd.buf.take());
            return Err(Error::Http(Box::new(response)));
        }
        verify.verify_response(&response)?;

        let params: Option<DeflateParams> =
            compression::verify_response(&deflate, values(response.headers(), "sec-websocket-extensions"))?;
        if let Some(params) = params {
            self.enable_deflate(rd, wr, params, &deflate);
        }

        debug!("client handshake complete");
        Ok(response)
    }
}

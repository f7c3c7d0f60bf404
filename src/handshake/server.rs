//! Server side of the upgrade handshake

use std::{io::Write, result::Result as StdResult};

use http::{
    header::{CONNECTION, CONTENT_LENGTH, HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE},
    HeaderMap, Method, Request as HttpRequest, Response as HttpResponse, StatusCode, Version,
};
use httparse::{Status as ParseStatus, EMPTY_HEADER};
use log::{debug, warn};

use crate::{
    error::{Error, HandshakeError, Result},
    handshake::{
        core::{derive_accept_key, is_valid_key},
        headers::{has_token, values, FromHttparse, MAX_HEADERS},
        machine::TryParse,
    },
    protocol::{
        compression,
        state::{Role, Status},
        websocket::{ReadState, WebSocketStream, WriteState},
    },
    stream::Transport,
};

/// Server Request type
pub type Request = HttpRequest<()>;
/// Server Response type
pub type Response = HttpResponse<()>;
/// Server Error Response type
pub type ErrorResponse = HttpResponse<Option<String>>;

fn create_parts<T>(req: &HttpRequest<T>) -> Result<http::response::Builder> {
    if req.version() != Version::HTTP_11 {
        return Err(HandshakeError::BadHttpVersion.into());
    }
    if req.method() != Method::GET {
        return Err(HandshakeError::BadMethod.into());
    }

    let headers = req.headers();
    if !headers.contains_key(HOST) {
        return Err(HandshakeError::NoHost.into());
    }
    if !has_token(headers, CONNECTION, "upgrade") {
        return Err(HandshakeError::NoConnection.into());
    }
    if !has_token(headers, UPGRADE, "websocket") {
        return Err(HandshakeError::NoUpgrade.into());
    }

    let key = headers.get(SEC_WEBSOCKET_KEY).ok_or(HandshakeError::NoSecKey)?;
    if !is_valid_key(key.as_bytes()) {
        return Err(HandshakeError::BadSecKey.into());
    }

    let version = headers.get(SEC_WEBSOCKET_VERSION).ok_or(HandshakeError::NoSecVersion)?;
    if version != "13" {
        return Err(HandshakeError::BadSecVersion.into());
    }

    let builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .version(req.version())
        .header(UPGRADE, "websocket")
        .header(CONNECTION, "Upgrade")
        .header(SEC_WEBSOCKET_ACCEPT, derive_accept_key(key.as_bytes()));

    Ok(builder)
}

/// Creates a response for the request
pub fn create_response(req: &Request) -> Result<Response> {
    Ok(create_parts(req)?.body(())?)
}

/// Creates a response for the request with a custom body
pub fn create_response_with_body<T1, T2>(
    req: &HttpRequest<T1>,
    generate_body: impl FnOnce() -> T2,
) -> Result<HttpResponse<T2>> {
    Ok(create_parts(req)?.body(generate_body())?)
}

/// The answer to a request that failed validation with `err`.
///
/// An unsupported `Sec-WebSocket-Version` gets `426 Upgrade Required` naming
/// the version we speak; everything else gets `400 Bad Request`.
pub fn rejection(err: &Error) -> ErrorResponse {
    let body = err.to_string();
    let mut res = ErrorResponse::new(None);
    *res.version_mut() = Version::HTTP_11;
    *res.status_mut() = StatusCode::BAD_REQUEST;
    if matches!(err, Error::Handshake(HandshakeError::BadSecVersion)) {
        *res.status_mut() = StatusCode::UPGRADE_REQUIRED;
        res.headers_mut().insert(SEC_WEBSOCKET_VERSION, http::HeaderValue::from_static("13"));
    }
    res.headers_mut().insert(CONTENT_LENGTH, body.len().into());
    *res.body_mut() = Some(body);
    res
}

/// Writes `response` to the stream `w`
pub fn write_response<T>(mut w: impl Write, res: &HttpResponse<T>) -> Result<()> {
    write!(w, "{:?} {}\r\n", res.version(), res.status())?;
    for (k, v) in res.headers() {
        write!(w, "{}: {}\r\n", k, v.to_str()?)?;
    }
    write!(w, "\r\n")?;

    Ok(())
}

impl TryParse for Request {
    fn try_parse(data: &[u8]) -> Result<Option<(usize, Self)>> {
        let mut header_buf = [EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut header_buf);

        Ok(match req.parse(data)? {
            ParseStatus::Complete(n) => Some((n, Request::from_httparse(req)?)),
            ParseStatus::Partial => None,
        })
    }
}

impl<'b: 'h, 'h> FromHttparse<httparse::Request<'h, 'b>> for Request {
    fn from_httparse(raw: httparse::Request<'h, 'b>) -> Result<Self> {
        let method = raw.method.ok_or(HandshakeError::Httparse(httparse::Error::Token))?;
        let path = raw.path.ok_or(HandshakeError::Httparse(httparse::Error::Token))?;

        let mut req = Request::new(());
        *req.method_mut() = Method::from_bytes(method.as_bytes()).map_err(http::Error::from)?;
        *req.uri_mut() = path.parse()?;
        *req.version_mut() = if raw.version == Some(1) { Version::HTTP_11 } else { Version::HTTP_10 };
        *req.headers_mut() = HeaderMap::from_httparse(raw.headers)?;

        Ok(req)
    }
}

/// Callback trait
///
/// The callback is called when the server receives an incoming WebSocket
/// handshake request from the client. Specifying a callback allows you to analyze incoming headers
/// and add additional headers to the response that the server sends to the client and / or reject the
/// connection based on the incoming headers.
pub trait Callback: Sized {
    /// Called whenever the server reads the request from the client and is ready to respond to it.
    /// May return additional reply headers.
    /// Returning an error resulting in rejecting the incoming connection.
    fn on_request(self, req: &Request, res: Response) -> StdResult<Response, ErrorResponse>;
}

impl<F> Callback for F
where
    F: FnOnce(&Request, Response) -> StdResult<Response, ErrorResponse>,
{
    fn on_request(self, req: &Request, res: Response) -> StdResult<Response, ErrorResponse> {
        self(req, res)
    }
}

/// Stub for an empty callback
#[derive(Clone, Copy, Debug)]
pub struct NoCallback;

impl Callback for NoCallback {
    fn on_request(self, _req: &Request, res: Response) -> StdResult<Response, ErrorResponse> {
        Ok(res)
    }
}

impl<T: Transport> WebSocketStream<T> {
    /// Read the client's upgrade request and answer it.
    pub async fn accept(&self) -> Result<()> {
        self.accept_with(NoCallback).await
    }

    /// Like [`accept`](Self::accept), passing the request and the prepared
    /// `101` response through `callback` before the response goes out.
    pub async fn accept_with<C: Callback>(&self, callback: C) -> Result<()> {
        self.server_handshake(None, callback).await
    }

    /// Answer an upgrade request that was already read from the transport,
    /// for example by an HTTP server routing requests.
    pub async fn accept_request(&self, request: &Request) -> Result<()> {
        self.accept_request_with(request, NoCallback).await
    }

    /// Like [`accept_request`](Self::accept_request) with a callback.
    pub async fn accept_request_with<C: Callback>(&self, request: &Request, callback: C) -> Result<()> {
        self.server_handshake(Some(request), callback).await
    }

    async fn server_handshake<C: Callback>(&self, request: Option<&Request>, callback: C) -> Result<()> {
        if self.role() != Role::Server || self.status() != Status::Handshake {
            return Err(Error::OperationAborted);
        }

        let mut wr = self.wr.lock().await;
        let mut rd = self.rd.lock().await;
        if self.status() != Status::Handshake {
            return Err(Error::OperationAborted);
        }

        let res = match request {
            Some(request) => self.server_upgrade(&mut rd, &mut wr, request, callback).await,
            None => match self.read_request(&mut rd).await {
                Ok(request) => self.server_upgrade(&mut rd, &mut wr, &request, callback).await,
                Err(e) => Err(e),
            },
        };

        match &res {
            Ok(()) => self.state.borrow_mut().transition(Status::Open),
            Err(e) => {
                debug!("server handshake failed: {e}");
                self.state.borrow_mut().transition(Status::Failed);
            }
        }
        drop(wr);
        drop(rd);
        res
    }

    async fn read_request(&self, rd: &mut ReadState) -> Result<Request> {
        let request: Request = match self.read_head(&mut rd.buf).await {
            Ok(request) => request,
            Err(e @ (Error::Io(_) | Error::Handshake(HandshakeError::IncompleteHandshake))) => return Err(e),
            Err(e) => {
                self.reject(&e).await?;
                return Err(e);
            }
        };
        if !rd.buf.is_empty() {
            let e: Error = HandshakeError::JunkAfterRequest.into();
            self.reject(&e).await?;
            return Err(e);
        }
        debug!("server received upgrade request for {}", request.uri());
        Ok(request)
    }

    /// Best-effort answer to a request we cannot upgrade.
    async fn reject(&self, err: &Error) -> Result<()> {
        let res = rejection(err);
        let mut out = Vec::new();
        write_response(&mut out, &res)?;
        if let Some(body) = res.body() {
            out.extend_from_slice(body.as_bytes());
        }
        if let Err(e) = self.write_all(&out).await {
            warn!("failed to send {} response: {e}", res.status());
        }
        Ok(())
    }

    async fn server_upgrade<C: Callback>(
        &self,
        rd: &mut ReadState,
        wr: &mut WriteState,
        request: &Request,
        callback: C,
    ) -> Result<()> {
        let mut response = match create_response(request) {
            Ok(response) => response,
            Err(e) => {
                self.reject(&e).await?;
                return Err(e);
            }
        };

        let deflate = self.config.compression;
        let params = compression::negotiate(&deflate, values(request.headers(), "sec-websocket-extensions"));
        if let Some(params) = params {
            response.headers_mut().insert(SEC_WEBSOCKET_EXTENSIONS, params.to_header().parse()?);
        }

        match callback.on_request(request, response) {
            Ok(response) => {
                let mut out = Vec::new();
                write_response(&mut out, &response)?;
                self.write_all(&out).await?;

                if let Some(params) = params {
                    self.enable_deflate(rd, wr, params, &deflate);
                }
                debug!("server handshake complete");
                Ok(())
            }
            Err(rejected) => {
                if rejected.status().is_success() {
                    return Err(HandshakeError::CustomResponseSuccessful.into());
                }

                let mut out = Vec::new();
                write_response(&mut out, &rejected)?;
                if let Some(body) = rejected.body() {
                    out.extend_from_slice(body.as_bytes());
                }
                self.write_all(&out).await?;

                debug!("request rejected with {}", rejected.status());
                let (parts, body) = rejected.into_parts();
                Err(Error::Http(Box::new(HttpResponse::from_parts(parts, body.map(String::into_bytes)))))
            }
        }
    }
}

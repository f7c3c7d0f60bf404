#![cfg(feature = "handshake")]
//! Upgrade handshakes between two engines, and against scripted peers.

use surge_ws::{
    error::{Error, HandshakeError},
    handshake::server::{ErrorResponse, Request, Response},
    DeflateConfig, Message, Role, Status, WebSocketConfig, WebSocketStream,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Read one HTTP head from a raw peer.
async fn read_head(peer: &mut DuplexStream) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(peer.read_u8().await.unwrap());
    }
    String::from_utf8(head).unwrap()
}

fn accept_value(request: &str) -> String {
    let key = request
        .lines()
        .find_map(|l| l.strip_prefix("Sec-WebSocket-Key: "))
        .unwrap();
    surge_ws::handshake::derive_accept_key(key.trim().as_bytes())
}

#[tokio::test]
async fn client_and_server_upgrade() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (a, b) = duplex(4096);
    let client = WebSocketStream::new(a, Role::Client);
    let server = WebSocketStream::new(b, Role::Server);

    let (res, accepted) = tokio::join!(
        client.handshake_with("example.com", "/chat?room=1", |req| {
            req.headers_mut().insert("Origin", "http://example.com".parse().unwrap());
        }),
        server.accept_with(|req: &Request, res: Response| -> Result<Response, ErrorResponse> {
            assert_eq!(req.uri(), "/chat?room=1");
            assert_eq!(req.headers()["Origin"], "http://example.com");
            Ok(res)
        }),
    );
    let res = res.unwrap();
    accepted.unwrap();
    assert_eq!(res.status(), 101);
    assert_eq!(client.status(), Status::Open);
    assert_eq!(server.status(), Status::Open);

    client.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(server.read_message().await.unwrap(), Message::Text("hello".into()));
    assert!(client.handshake("example.com", "/").await.is_err());
}

#[tokio::test]
async fn free_functions_upgrade() {
    let (a, b) = duplex(4096);
    let (client, server) = tokio::join!(surge_ws::client("ws://localhost:9001/", a), surge_ws::accept(b));
    let (client, response) = client.unwrap();
    let server = server.unwrap();
    assert!(response.headers().contains_key("sec-websocket-accept"));

    server.set_text(false);
    server.write(&[1, 2, 3]).await.unwrap();
    assert_eq!(client.read_message().await.unwrap(), Message::Binary(vec![1, 2, 3]));
}

#[tokio::test]
async fn deflate_is_negotiated_and_used() {
    let config = WebSocketConfig::default().compression(DeflateConfig::enabled());
    let (a, b) = duplex(1 << 16);
    let client = WebSocketStream::with_config(a, Role::Client, config);
    let server = WebSocketStream::with_config(b, Role::Server, config);

    let (res, accepted) = tokio::join!(client.handshake("localhost", "/"), server.accept());
    let res = res.unwrap();
    accepted.unwrap();
    assert_eq!(res.headers()["sec-websocket-extensions"], "permessage-deflate");

    let text = "compress me ".repeat(2000);
    for _ in 0..3 {
        client.send(Message::Text(text.clone())).await.unwrap();
        assert_eq!(server.read_message().await.unwrap(), Message::Text(text.clone()));
    }

    server.send(Message::Binary(vec![7; 50_000])).await.unwrap();
    assert_eq!(client.read_message().await.unwrap(), Message::Binary(vec![7; 50_000]));

    server.send(Message::Text(String::new())).await.unwrap();
    assert_eq!(client.read_message().await.unwrap(), Message::Text(String::new()));
}

#[tokio::test]
async fn deflate_declined_by_server() {
    let (a, b) = duplex(4096);
    let client = WebSocketStream::with_config(
        a,
        Role::Client,
        WebSocketConfig::default().compression(DeflateConfig::enabled()),
    );
    let server = WebSocketStream::new(b, Role::Server);

    let (res, accepted) = tokio::join!(client.handshake("localhost", "/"), server.accept());
    assert!(!res.unwrap().headers().contains_key("sec-websocket-extensions"));
    accepted.unwrap();

    client.write(b"plain").await.unwrap();
    assert_eq!(server.read_message().await.unwrap(), Message::Binary(b"plain".to_vec()));
}

#[tokio::test]
async fn wrong_accept_key_fails_client() {
    let (a, mut peer) = duplex(4096);
    let client = WebSocketStream::new(a, Role::Client);

    let peer = async {
        read_head(&mut peer).await;
        peer.write_all(
            b"HTTP/1.1 101 Switching Protocols\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
        )
        .await
        .unwrap();
    };

    let (res, ()) = tokio::join!(client.handshake("localhost", "/"), peer);
    assert!(matches!(res, Err(Error::Handshake(HandshakeError::BadSecAccept))));
    assert_eq!(client.status(), Status::Failed);
    assert!(matches!(client.write(b"x").await, Err(Error::OperationAborted)));
}

#[tokio::test]
async fn missing_connection_upgrade_fails_client() {
    let (a, mut peer) = duplex(4096);
    let client = WebSocketStream::new(a, Role::Client);

    let peer = async {
        let request = read_head(&mut peer).await;
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: keep-alive\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept_value(&request)
        );
        peer.write_all(response.as_bytes()).await.unwrap();
    };

    let (res, ()) = tokio::join!(client.handshake("localhost", "/"), peer);
    assert!(matches!(res, Err(Error::Handshake(HandshakeError::NoConnection))));
}

#[tokio::test]
async fn declined_upgrade_carries_body() {
    let (a, mut peer) = duplex(4096);
    let client = WebSocketStream::new(a, Role::Client);

    let peer = async {
        read_head(&mut peer).await;
        peer.write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 4\r\n\r\nnope").await.unwrap();
    };

    let (res, ()) = tokio::join!(client.handshake("localhost", "/"), peer);
    match res {
        Err(Error::Http(response)) => {
            assert_eq!(response.status(), 403);
            assert_eq!(response.body().as_deref(), Some(&b"nope"[..]));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn unsupported_version_gets_426() {
    let (a, mut peer) = duplex(4096);
    let server = WebSocketStream::new(a, Role::Server);

    let peer = async {
        peer.write_all(
            b"GET / HTTP/1.1\r\n\
              Host: localhost\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
              Sec-WebSocket-Version: 8\r\n\r\n",
        )
        .await
        .unwrap();
        read_head(&mut peer).await
    };

    let (res, response) = tokio::join!(server.accept(), peer);
    assert!(matches!(res, Err(Error::Handshake(HandshakeError::BadSecVersion))));
    assert!(response.starts_with("HTTP/1.1 426 Upgrade Required\r\n"));
    assert!(response.contains("sec-websocket-version: 13\r\n"));
    assert_eq!(server.status(), Status::Failed);
}

#[tokio::test]
async fn callback_can_reject() {
    let (a, b) = duplex(4096);
    let client = WebSocketStream::new(a, Role::Client);
    let server = WebSocketStream::new(b, Role::Server);

    let reject = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
        let mut res = ErrorResponse::new(Some("go away".into()));
        *res.status_mut() = http::StatusCode::FORBIDDEN;
        Err(res)
    };

    let (res, accepted) = tokio::join!(client.handshake("localhost", "/"), server.accept_with(reject));
    assert!(matches!(accepted, Err(Error::Http(ref r)) if r.status() == 403));
    match res {
        Err(Error::Http(response)) => assert_eq!(response.status(), 403),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(client.status(), Status::Failed);
    assert_eq!(server.status(), Status::Failed);
}

#[tokio::test]
async fn successful_rejection_is_an_error() {
    let (a, mut peer) = duplex(4096);
    let server = WebSocketStream::new(a, Role::Server);

    peer.write_all(
        b"GET / HTTP/1.1\r\nHost: a\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
    )
    .await
    .unwrap();

    let res = server.accept_with(|_: &Request, _: Response| -> Result<Response, ErrorResponse> { Err(ErrorResponse::new(None)) }).await;
    assert!(matches!(res, Err(Error::Handshake(HandshakeError::CustomResponseSuccessful))));
}

#[tokio::test]
async fn frames_before_upgrade_are_refused() {
    let (a, _peer) = duplex(64);
    let ws = WebSocketStream::new(a, Role::Server);
    assert!(matches!(ws.write(b"early").await, Err(Error::OperationAborted)));
    assert!(matches!(ws.read_message().await, Err(Error::OperationAborted)));
    assert!(matches!(ws.close(None).await, Err(Error::OperationAborted)));
    assert_eq!(ws.status(), Status::Handshake);
}

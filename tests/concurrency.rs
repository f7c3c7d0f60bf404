//! Reads, writes and control frames sharing one connection on one task.

use std::{cell::RefCell, rc::Rc};

use surge_ws::{
    protocol::frame::codec::FrameType, Message, Role, Status, WebSocketConfig, WebSocketStream,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn ping_during_write_is_answered_after_it() {
    let _ = env_logger::builder().is_test(true).try_init();
    // small pipe so the large write stays in flight
    let (a, mut peer) = duplex(64);
    let server = WebSocketStream::from_raw_socket(a, Role::Server, WebSocketConfig::default());

    // masked ping "abc", then masked text "hi"
    peer.write_all(&[0x89, 0x83, 0, 0, 0, 0, b'a', b'b', b'c']).await.unwrap();
    peer.write_all(&[0x81, 0x82, 0, 0, 0, 0, b'h', b'i']).await.unwrap();

    let payload = vec![0x5a; 1000];
    let reader = async {
        let mut wire = vec![0u8; 4 + 1000 + 5];
        peer.read_exact(&mut wire).await.unwrap();
        wire
    };

    let mut text = Vec::new();
    let (written, read, wire) = tokio::join!(server.write(&payload), server.read(&mut text), reader);
    written.unwrap();
    assert_eq!(read.unwrap(), 2);
    assert_eq!(text, b"hi");
    assert!(server.got_text());

    assert_eq!(&wire[..4], &[0x82, 0x7e, 0x03, 0xe8]);
    assert!(wire[4..1004].iter().all(|&b| b == 0x5a));
    assert_eq!(&wire[1004..], &[0x8a, 0x03, b'a', b'b', b'c']);

    // nothing else was sent in between
    server.set_text(true);
    server.write(b"end").await.unwrap();
    let mut tail = [0u8; 5];
    peer.read_exact(&mut tail).await.unwrap();
    assert_eq!(tail, [0x81, 0x03, b'e', b'n', b'd']);
}

#[tokio::test]
async fn echo_with_fragmentation() {
    let (a, b) = duplex(1 << 12);
    let config = WebSocketConfig::default().write_buffer_size(100);
    let client = WebSocketStream::from_raw_socket(a, Role::Client, config);
    let server = WebSocketStream::from_raw_socket(b, Role::Server, WebSocketConfig::default());

    let messages = vec![
        Message::Text("short".into()),
        Message::Binary((0..=255).cycle().take(5000).collect()),
        Message::Text("ünïcödé ".repeat(200)),
        Message::Binary(Vec::new()),
    ];

    let sender = async {
        for msg in messages.clone() {
            client.send(msg).await.unwrap();
        }
    };
    let echo = async {
        let mut got = Vec::new();
        for _ in 0..messages.len() {
            got.push(server.read_message().await.unwrap());
        }
        got
    };

    let ((), got) = tokio::join!(sender, echo);
    assert_eq!(got, messages);
}

#[tokio::test]
async fn streamed_message_in_parts() {
    let (a, b) = duplex(1 << 12);
    let client = WebSocketStream::from_raw_socket(a, Role::Client, WebSocketConfig::default());
    let server = WebSocketStream::from_raw_socket(b, Role::Server, WebSocketConfig::default());

    client.set_text(true);
    client.write_frame(b"one ", false).await.unwrap();
    // switching type mid-message has no effect on the continuation
    client.set_text(false);
    client.write_frame(b"two ", false).await.unwrap();
    client.write_frame(b"three", true).await.unwrap();

    let mut out = Vec::new();
    let mut parts = 0;
    loop {
        server.read_some(&mut out, 3).await.unwrap();
        parts += 1;
        if server.is_message_done() {
            break;
        }
    }
    assert_eq!(out, b"one two three");
    assert!(server.got_text());
    assert!(parts >= 5);
}

#[tokio::test]
async fn pings_reach_callback_and_get_pongs() {
    let (a, b) = duplex(1 << 12);
    let client = WebSocketStream::from_raw_socket(a, Role::Client, WebSocketConfig::default());
    let server = WebSocketStream::from_raw_socket(b, Role::Server, WebSocketConfig::default());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    client.set_control_callback(move |kind, payload| log.borrow_mut().push((kind, payload.to_vec())));

    client.ping(b"one").await.unwrap();
    server.ping(b"two").await.unwrap();
    server.write(b"data").await.unwrap();

    // the server answers "one" while reading; the client answers "two"
    let (s, c) = tokio::join!(async {
        client.write(b"x").await.unwrap();
        server.read_message().await
    }, client.read_message());
    assert_eq!(s.unwrap(), Message::Binary(b"x".to_vec()));
    assert_eq!(c.unwrap(), Message::Binary(b"data".to_vec()));

    client.write(b"y").await.unwrap();
    assert_eq!(server.read_message().await.unwrap(), Message::Binary(b"y".to_vec()));
    server.write(b"z").await.unwrap();
    assert_eq!(client.read_message().await.unwrap(), Message::Binary(b"z".to_vec()));

    assert_eq!(
        *seen.borrow(),
        vec![(FrameType::Ping, b"two".to_vec()), (FrameType::Pong, b"one".to_vec())]
    );
    assert_eq!(client.status(), Status::Open);
}

#[tokio::test]
async fn ping_between_fragments_leaves_message_intact() {
    let (a, mut peer) = duplex(1 << 12);
    let client = WebSocketStream::from_raw_socket(a, Role::Client, WebSocketConfig::default());

    // "Hel", ping "p", "lo"
    peer.write_all(&[0x01, 0x03, b'H', b'e', b'l']).await.unwrap();
    peer.write_all(&[0x89, 0x01, b'p']).await.unwrap();
    peer.write_all(&[0x80, 0x02, b'l', b'o']).await.unwrap();

    assert_eq!(client.read_message().await.unwrap(), Message::Text("Hello".into()));
    assert!(client.is_message_done());

    client.set_text(true);
    client.write(b"end").await.unwrap();

    // one masked pong, then the text frame
    let mut wire = [0u8; 7 + 9];
    peer.read_exact(&mut wire).await.unwrap();
    assert_eq!(&wire[..2], &[0x8a, 0x81]);
    assert_eq!(wire[6] ^ wire[2], b'p');
    assert_eq!(&wire[7..9], &[0x81, 0x83]);
    let key = &wire[9..13];
    let end: Vec<u8> = wire[13..].iter().enumerate().map(|(i, b)| b ^ key[i % 4]).collect();
    assert_eq!(end, b"end");
}

//! Tests for the buffered channel and the TCP connector.

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, duplex},
    net::TcpListener,
};

use super::*;

#[tokio::test]
async fn reads_bytes_in_arrival_order_across_refills() {
    let (client, mut server) = duplex(64);
    let mut channel = ByteChannel::with_capacity(client, None, 4);
    server.write_all(b"abcdefghij").await.expect("write");
    drop(server);

    let mut seen = Vec::new();
    while let Some(byte) = channel.next_byte().await.expect("read byte") {
        seen.push(byte);
    }
    assert_eq!(seen, b"abcdefghij");
}

#[tokio::test]
async fn read_available_drains_buffer_before_socket() {
    let (client, mut server) = duplex(64);
    let mut channel = ByteChannel::with_capacity(client, None, 16);
    server.write_all(b"hello").await.expect("write");

    assert_eq!(channel.next_byte().await.expect("read"), Some(b'h'));
    let mut buf = [0u8; 16];
    let count = channel.read_available(&mut buf).await.expect("read");
    assert_eq!(&buf[..count], b"ello");

    drop(server);
    assert_eq!(channel.read_available(&mut buf).await.expect("eof"), 0);
}

#[tokio::test]
async fn take_up_to_respects_limit() {
    let (client, mut server) = duplex(64);
    let mut channel = ByteChannel::new(client, None);
    server.write_all(b"0123456789").await.expect("write");
    drop(server);

    let first = channel.take_up_to(4).await.expect("take").expect("bytes");
    assert_eq!(&first[..], b"0123");
    let rest = channel.take_up_to(100).await.expect("take").expect("bytes");
    assert_eq!(&rest[..], b"456789");
    assert!(channel.take_up_to(1).await.expect("take").is_none());
}

#[tokio::test(start_paused = true)]
async fn silent_peer_triggers_idle_timeout() {
    let (client, _server) = duplex(64);
    let mut channel = ByteChannel::new(client, Some(Duration::from_secs(20)));

    let err = channel.next_byte().await.expect_err("read should time out");
    assert!(
        matches!(err, ClientError::IdleTimeout(limit) if limit == Duration::from_secs(20)),
        "got {err:?}"
    );
}

#[tokio::test]
async fn close_is_idempotent_and_blocks_writes() {
    let (client, mut server) = duplex(64);
    let mut channel = ByteChannel::new(client, None);
    channel.write_all(b"ping").await.expect("write");
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"ping");

    channel.close().await;
    channel.close().await;
    assert!(!channel.is_open());
    assert!(channel.next_byte().await.expect("closed read").is_none());
    let err = channel.write_all(b"late").await.expect_err("write after close");
    assert!(matches!(err, ClientError::Io(_)), "got {err:?}");
}

#[tokio::test]
async fn tcp_connector_reaches_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let accept = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream.write_all(b"ok").await.expect("write");
    });

    let endpoint = Endpoint::parse(&format!("http://{addr}/")).expect("endpoint");
    let mut channel = TcpConnector::default()
        .connect(&endpoint, 16)
        .await
        .expect("connect");
    assert_eq!(channel.next_byte().await.expect("read"), Some(b'o'));
    accept.await.expect("join accept task");
}

#[tokio::test]
async fn tcp_connector_reports_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let endpoint = Endpoint::parse(&format!("http://{addr}/")).expect("endpoint");
    let err = TcpConnector::default()
        .connect(&endpoint, 16)
        .await
        .expect_err("connect should fail");
    assert!(
        matches!(err, ClientError::Connect { port, .. } if port == addr.port()),
        "got {err:?}"
    );
}

#[tokio::test]
async fn tcp_connector_refuses_https() {
    let endpoint = Endpoint::parse("https://camera.local/").expect("endpoint");
    let err = TcpConnector::default()
        .connect(&endpoint, 16)
        .await
        .expect_err("https is unsupported");
    assert!(matches!(err, ClientError::UnsupportedScheme(_)), "got {err:?}");
}

//! Tests for the stream-oriented UDP socket.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

use udp_conduit::{AddressFamily, PipeConfig, PipeEnd, SocketState, UdpError, UdpPipe};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll until the pipe's listen loop has bound a local address.
async fn wait_for_addr(pipe: &UdpPipe) -> std::net::SocketAddr {
    for _ in 0..100 {
        if let Some(addr) = pipe.local_addr() {
            return addr;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("pipe did not bind in time");
}

#[test]
fn test_config_builder() {
    let config = PipeConfig::new().buffer_size(2048).reuse_address(false);

    assert_eq!(config.buffer_size, 2048);
    assert!(!config.reuse_address);
}

#[test]
fn test_initial_state() {
    let pipe = UdpPipe::new(AddressFamily::V6);

    assert_eq!(pipe.family(), AddressFamily::V6);
    assert_eq!(pipe.state(), SocketState::Unbound);
    assert!(pipe.local_addr().is_none());
    assert!(pipe.peer_addr().is_none());
}

#[tokio::test]
async fn test_listen_roundtrip_v4() {
    let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
    let (mut reader, writer) = tokio::io::simplex(64 * 1024);

    let listen_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.listen(writer, "127.0.0.1:0".parse().unwrap()).await }
    });

    let addr = wait_for_addr(&pipe).await;
    assert_ne!(addr.port(), 0);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&[1, 2, 3, 4], addr).await.unwrap();

    let mut buf = [0u8; 16];
    let n = timeout(RECV_TIMEOUT, reader.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3, 4]);

    pipe.close();
    let end = timeout(RECV_TIMEOUT, listen_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, PipeEnd::Cancelled);
}

#[tokio::test]
async fn test_listen_roundtrip_v6() {
    let pipe = Arc::new(UdpPipe::new(AddressFamily::V6));
    let (mut reader, writer) = tokio::io::simplex(64 * 1024);

    let listen_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.listen(writer, "[::1]:0".parse().unwrap()).await }
    });

    let addr = wait_for_addr(&pipe).await;
    let sender = UdpSocket::bind("[::1]:0").await.unwrap();
    sender.send_to(b"over six", addr).await.unwrap();

    let mut buf = [0u8; 16];
    let n = timeout(RECV_TIMEOUT, reader.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"over six");

    pipe.close();
    let end = timeout(RECV_TIMEOUT, listen_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, PipeEnd::Cancelled);
}

#[tokio::test]
async fn test_wildcard_bind_loopback_delivery() {
    let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
    let (mut reader, writer) = tokio::io::simplex(64 * 1024);

    let listen_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.listen(writer, "0.0.0.0:0".parse().unwrap()).await }
    });

    let port = wait_for_addr(&pipe).await.port();
    assert_ne!(port, 0);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender
        .send_to(&[1, 2, 3, 4], format!("127.0.0.1:{port}"))
        .await
        .unwrap();

    let mut buf = [0u8; 16];
    let n = timeout(RECV_TIMEOUT, reader.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3, 4]);

    pipe.close();
    let _ = timeout(RECV_TIMEOUT, listen_task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_send_source_complete() {
    let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();

    let pipe = UdpPipe::new(AddressFamily::V4);
    let source: &[u8] = &[1, 2, 3, 4];
    let end = pipe.send(source, target_addr).await.unwrap();
    assert_eq!(end, PipeEnd::SourceComplete);
    assert_eq!(pipe.peer_addr(), Some(target_addr));

    let mut buf = [0u8; 16];
    let (n, from) = timeout(RECV_TIMEOUT, target.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3, 4]);
    // The pipe bound the family wildcard, so only the port is comparable.
    assert_eq!(from.port(), pipe.local_addr().unwrap().port());
}

#[tokio::test]
async fn test_send_preserves_datagram_boundaries() {
    let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();

    let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
    let (source, mut feeder) = tokio::io::simplex(64 * 1024);

    let send_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.send(source, target_addr).await }
    });

    // Each flushed run arrives as its own datagram.
    let mut buf = [0u8; 64];
    feeder.write_all(b"first").await.unwrap();
    feeder.flush().await.unwrap();
    let (n, _) = timeout(RECV_TIMEOUT, target.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"first");

    feeder.write_all(b"second").await.unwrap();
    feeder.flush().await.unwrap();
    let (n, _) = timeout(RECV_TIMEOUT, target.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"second");

    feeder.shutdown().await.unwrap();
    let end = timeout(RECV_TIMEOUT, send_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, PipeEnd::SourceComplete);
}

#[tokio::test]
async fn test_concurrent_listen_and_send() {
    let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
    let (mut inbound, inbound_writer) = tokio::io::simplex(64 * 1024);

    let listen_task = tokio::spawn({
        let pipe = pipe.clone();
        async move {
            pipe.listen(inbound_writer, "127.0.0.1:0".parse().unwrap())
                .await
        }
    });
    let addr = wait_for_addr(&pipe).await;

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let (outbound_source, mut outbound) = tokio::io::simplex(64 * 1024);
    let send_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.send(outbound_source, peer_addr).await }
    });

    // Outbound direction makes progress.
    outbound.write_all(&[9, 9, 9]).await.unwrap();
    outbound.flush().await.unwrap();
    let mut buf = [0u8; 16];
    let (n, from) = timeout(RECV_TIMEOUT, peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], &[9, 9, 9]);
    assert_eq!(from, addr);

    // Inbound direction still makes progress on the same socket.
    peer.send_to(&[1, 2, 3, 4], addr).await.unwrap();
    let n = timeout(RECV_TIMEOUT, inbound.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3, 4]);

    // Completing the source ends the send loop; closing ends the listen loop.
    outbound.shutdown().await.unwrap();
    let end = timeout(RECV_TIMEOUT, send_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, PipeEnd::SourceComplete);

    pipe.close();
    let end = timeout(RECV_TIMEOUT, listen_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, PipeEnd::Cancelled);

    // Completion is visible to the consumer as end-of-stream.
    let n = timeout(RECV_TIMEOUT, inbound.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_downstream_closed_ends_listen() {
    let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
    let (reader, writer) = tokio::io::simplex(64 * 1024);

    let listen_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.listen(writer, "127.0.0.1:0".parse().unwrap()).await }
    });
    let addr = wait_for_addr(&pipe).await;

    // Consumer walks away; the next delivery ends the loop.
    drop(reader);
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(b"anyone there", addr).await.unwrap();

    let end = timeout(RECV_TIMEOUT, listen_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, PipeEnd::DownstreamClosed);
}

#[tokio::test]
async fn test_zero_length_datagram_ends_listen() {
    let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
    let (mut reader, writer) = tokio::io::simplex(64 * 1024);

    let listen_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.listen(writer, "127.0.0.1:0".parse().unwrap()).await }
    });
    let addr = wait_for_addr(&pipe).await;

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&[], addr).await.unwrap();

    let end = timeout(RECV_TIMEOUT, listen_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, PipeEnd::PeerClosed);

    // The sink was shut down, so the consumer observes end-of-stream.
    let mut buf = [0u8; 16];
    let n = timeout(RECV_TIMEOUT, reader.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_listen_family_mismatch_fails() {
    let pipe = UdpPipe::new(AddressFamily::V4);
    let (mut reader, writer) = tokio::io::simplex(1024);

    let result = pipe.listen(writer, "[::1]:0".parse().unwrap()).await;
    assert!(matches!(result, Err(UdpError::FamilyMismatch { .. })));

    // Even on a pre-loop failure the sink is shut down, so the consumer
    // observes end-of-stream instead of hanging.
    let mut buf = [0u8; 8];
    let n = timeout(RECV_TIMEOUT, reader.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_listen_on_closed_pipe_shuts_down_sink() {
    let pipe = UdpPipe::new(AddressFamily::V4);
    pipe.close();
    let (mut reader, writer) = tokio::io::simplex(1024);

    let result = pipe.listen(writer, "127.0.0.1:0".parse().unwrap()).await;
    assert!(matches!(result, Err(UdpError::InvalidState(_))));

    let mut buf = [0u8; 8];
    let n = timeout(RECV_TIMEOUT, reader.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_send_family_mismatch_fails() {
    let pipe = UdpPipe::new(AddressFamily::V6);
    let source: &[u8] = b"nope";

    let result = pipe.send(source, "127.0.0.1:9999".parse().unwrap()).await;
    assert!(matches!(result, Err(UdpError::FamilyMismatch { .. })));
}

#[tokio::test]
async fn test_multicast_before_bind_fails() {
    let pipe = UdpPipe::new(AddressFamily::V4);
    let group: IpAddr = "239.255.0.1".parse().unwrap();

    assert!(matches!(
        pipe.join_multicast_group(group),
        Err(UdpError::InvalidState(_))
    ));
    assert!(matches!(
        pipe.drop_multicast_group(group),
        Err(UdpError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_multicast_rejects_bad_groups_after_bind() {
    let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
    let (_reader, writer) = tokio::io::simplex(1024);

    let _listen_task = tokio::spawn({
        let pipe = pipe.clone();
        async move { pipe.listen(writer, "127.0.0.1:0".parse().unwrap()).await }
    });
    wait_for_addr(&pipe).await;

    let unicast: IpAddr = "192.0.2.1".parse().unwrap();
    assert!(matches!(
        pipe.join_multicast_group(unicast),
        Err(UdpError::NotMulticast(_))
    ));

    let v6_group: IpAddr = "ff18::83:0:0:1".parse().unwrap();
    assert!(matches!(
        pipe.join_multicast_group(v6_group),
        Err(UdpError::FamilyMismatch { .. })
    ));

    pipe.close();
}

#[tokio::test]
async fn test_close_without_use_is_safe() {
    let pipe = UdpPipe::new(AddressFamily::V4);
    pipe.close();
    pipe.close();
    assert_eq!(pipe.state(), SocketState::Closed);

    let (_reader, writer) = tokio::io::simplex(1024);
    let result = pipe.listen(writer, "127.0.0.1:0".parse().unwrap()).await;
    assert!(matches!(result, Err(UdpError::InvalidState(_))));

    let source: &[u8] = b"late";
    let result = pipe.send(source, "127.0.0.1:9999".parse().unwrap()).await;
    assert!(matches!(result, Err(UdpError::InvalidState(_))));
}

#[tokio::test]
async fn test_second_remote_association_fails() {
    let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();
    let other = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let other_addr = other.local_addr().unwrap();

    let pipe = UdpPipe::new(AddressFamily::V4);
    let source: &[u8] = b"one";
    pipe.send(source, target_addr).await.unwrap();

    let source: &[u8] = b"two";
    let result = pipe.send(source, other_addr).await;
    assert!(matches!(result, Err(UdpError::InvalidState(_))));
}

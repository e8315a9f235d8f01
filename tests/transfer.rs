//! End-to-end transfers over loopback UDP.
//!
//! Clean transfers run the real client against the real server. Loss and
//! duplication are staged with a scripted peer on a plain socket that
//! plays the other side of the protocol by hand.

use std::net::SocketAddr;
use std::time::Duration;

use async_std::task;

use minitftp::tftp::client::{download, ClientConfig, ClientError, TransferSummary};
use minitftp::tftp::server::{ServerConfig, ServerHandle, TFTPServer};
use minitftp::tftp::shared::ack_packet::AckPacket;
use minitftp::tftp::shared::data_channel::{is_timeout, DataChannel};
use minitftp::tftp::shared::data_packet::DataPacket;
use minitftp::tftp::shared::request_packet::ReadRequestPacket;
use minitftp::tftp::shared::{Serializable, TFTPPacket, STRIDE_SIZE};
use minitftp::tftp::store::MemoryStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Recognisable contents: byte `i` is `i % 251`.
fn contents(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn quick_server() -> ServerConfig {
    ServerConfig {
        timeout: Duration::from_millis(200),
        max_attempts: 5,
    }
}

fn quick_client() -> ClientConfig {
    ClientConfig {
        timeout: Duration::from_millis(500),
    }
}

async fn start_server(store: MemoryStore) -> ServerHandle {
    TFTPServer::bind("127.0.0.1:0", store, quick_server())
        .await
        .expect("bind server")
        .spawn()
        .expect("spawn server")
}

async fn fetch(
    server: SocketAddr,
    filename: &str,
    config: ClientConfig,
) -> (Result<TransferSummary, ClientError>, Vec<u8>) {
    let mut sink = Vec::new();
    let result = download(server, filename, &mut sink, &config).await;
    (result, sink)
}

/// Receives the next packet on a scripted peer, failing the test on silence.
async fn expect_packet(peer: &DataChannel) -> (TFTPPacket, SocketAddr) {
    let (packet, from) = peer.recv_packet().await.expect("peer receive");
    (packet.expect("decodable packet"), from)
}

async fn expect_data(peer: &DataChannel) -> (DataPacket, SocketAddr) {
    match expect_packet(peer).await {
        (TFTPPacket::DATA(dp), from) => (dp, from),
        (p, _) => panic!("expected DATA, got {}", p),
    }
}

async fn expect_ack(peer: &DataChannel) -> (u8, SocketAddr) {
    match expect_packet(peer).await {
        (TFTPPacket::ACK(ack), from) => (ack.blk(), from),
        (p, _) => panic!("expected ACK, got {}", p),
    }
}

async fn expect_silence(peer: &DataChannel) {
    match peer.recv_packet().await {
        Err(e) if is_timeout(&e) => {}
        other => panic!("expected silence, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Clean transfers
// ---------------------------------------------------------------------------

#[async_std::test]
async fn downloads_file_in_two_blocks() {
    let file = contents(1000);
    let server = start_server(MemoryStore::new().with_file("foo", file.clone())).await;

    let (result, sink) = fetch(server.local_addr(), "foo", quick_client()).await;
    let summary = result.expect("download");

    assert_eq!(sink, file);
    assert_eq!(summary.bytes, 1000);
    assert_eq!(summary.blocks, 2);
    assert_eq!(summary.acks_sent, 2);
    assert_ne!(summary.server, server.local_addr());

    server.shutdown().await;
}

#[async_std::test]
async fn exact_stride_ends_with_empty_block() {
    let file = contents(STRIDE_SIZE);
    let server = start_server(MemoryStore::new().with_file("foo", file.clone())).await;

    let (result, sink) = fetch(server.local_addr(), "foo", quick_client()).await;
    let summary = result.expect("download");

    assert_eq!(sink, file);
    assert_eq!(summary.blocks, 2);
    assert_eq!(summary.acks_sent, 2);

    server.shutdown().await;
}

#[async_std::test]
async fn server_sends_trailing_empty_block() {
    let server = start_server(MemoryStore::new().with_file("foo", contents(STRIDE_SIZE))).await;
    let peer = DataChannel::bind("127.0.0.1:0", Duration::from_secs(2))
        .await
        .unwrap();

    peer.send_packet(
        TFTPPacket::RRQ(ReadRequestPacket::new("foo")),
        server.local_addr(),
    )
    .await
    .unwrap();

    let (first, worker) = expect_data(&peer).await;
    assert_eq!(first.blk(), 1);
    assert_eq!(first.len(), STRIDE_SIZE);
    peer.send_packet(TFTPPacket::ACK(AckPacket::new(1)), worker)
        .await
        .unwrap();

    let (second, _) = expect_data(&peer).await;
    assert_eq!(second.blk(), 2);
    assert!(second.is_empty());
    peer.send_packet(TFTPPacket::ACK(AckPacket::new(2)), worker)
        .await
        .unwrap();

    server.shutdown().await;
}

#[async_std::test]
async fn empty_file_is_a_single_empty_block() {
    let server = start_server(MemoryStore::new().with_file("empty", Vec::new())).await;

    let (result, sink) = fetch(server.local_addr(), "empty", quick_client()).await;
    let summary = result.expect("download");

    assert!(sink.is_empty());
    assert_eq!(summary.blocks, 1);

    server.shutdown().await;
}

#[async_std::test]
async fn block_numbers_wrap_past_255() {
    // 300 full blocks and a short one: block numbers go 1..=255, 1..=46.
    let file = contents(300 * STRIDE_SIZE + 17);
    let server = start_server(MemoryStore::new().with_file("big", file.clone())).await;

    let (result, sink) = fetch(server.local_addr(), "big", quick_client()).await;
    let summary = result.expect("download");

    assert_eq!(summary.blocks, 301);
    assert_eq!(sink.len(), file.len());
    assert!(sink == file, "contents differ after wraparound");

    server.shutdown().await;
}

#[async_std::test]
async fn concurrent_downloads_are_independent() {
    let store = MemoryStore::new()
        .with_file("a", contents(5000))
        .with_file("b", contents(3 * STRIDE_SIZE));
    let server = start_server(store).await;
    let addr = server.local_addr();

    let a = task::spawn(async move { fetch(addr, "a", quick_client()).await });
    let b = task::spawn(async move { fetch(addr, "b", quick_client()).await });

    let (ra, sa) = a.await;
    let (rb, sb) = b.await;
    ra.expect("download a");
    rb.expect("download b");
    assert_eq!(sa, contents(5000));
    assert_eq!(sb, contents(3 * STRIDE_SIZE));

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Loss and duplication
// ---------------------------------------------------------------------------

#[async_std::test]
async fn server_retransmits_until_attempts_run_out() {
    let server = start_server(MemoryStore::new().with_file("foo", contents(1000))).await;
    let peer = DataChannel::bind("127.0.0.1:0", Duration::from_secs(1))
        .await
        .unwrap();

    peer.send_packet(
        TFTPPacket::RRQ(ReadRequestPacket::new("foo")),
        server.local_addr(),
    )
    .await
    .unwrap();

    // Never acknowledge: the same block keeps coming, five times in all.
    let (first, worker) = expect_data(&peer).await;
    for _ in 1..5 {
        let (again, from) = expect_data(&peer).await;
        assert_eq!(from, worker);
        assert_eq!(again, first);
    }
    expect_silence(&peer).await;

    server.shutdown().await;
}

#[async_std::test]
async fn server_resends_block_after_lost_ack() {
    let server = start_server(MemoryStore::new().with_file("foo", contents(1000))).await;
    let peer = DataChannel::bind("127.0.0.1:0", Duration::from_secs(2))
        .await
        .unwrap();

    peer.send_packet(
        TFTPPacket::RRQ(ReadRequestPacket::new("foo")),
        server.local_addr(),
    )
    .await
    .unwrap();

    // Drop the first copy of block 1 on the floor; the retransmission
    // is identical and acknowledging it moves the transfer along.
    let (first, worker) = expect_data(&peer).await;
    let (again, _) = expect_data(&peer).await;
    assert_eq!(again, first);
    peer.send_packet(TFTPPacket::ACK(AckPacket::new(1)), worker)
        .await
        .unwrap();

    let (second, _) = expect_data(&peer).await;
    assert_eq!(second.blk(), 2);
    assert_eq!(second.data(), contents(1000)[STRIDE_SIZE..].to_vec());
    peer.send_packet(TFTPPacket::ACK(AckPacket::new(2)), worker)
        .await
        .unwrap();

    server.shutdown().await;
}

#[async_std::test]
async fn stray_acks_count_as_attempts() {
    // The ACK wait outlasts the peer's patience, so any DATA the peer sees
    // was triggered by the packet it just sent, not by a timeout.
    let config = ServerConfig {
        timeout: Duration::from_secs(3),
        max_attempts: 5,
    };
    let store = MemoryStore::new().with_file("foo", contents(1000));
    let server = TFTPServer::bind("127.0.0.1:0", store, config)
        .await
        .unwrap()
        .spawn()
        .unwrap();
    let peer = DataChannel::bind("127.0.0.1:0", Duration::from_secs(1))
        .await
        .unwrap();
    let stranger = DataChannel::bind("127.0.0.1:0", Duration::from_secs(1))
        .await
        .unwrap();

    peer.send_packet(
        TFTPPacket::RRQ(ReadRequestPacket::new("foo")),
        server.local_addr(),
    )
    .await
    .unwrap();
    let (first, worker) = expect_data(&peer).await;
    assert_eq!(first.blk(), 1);

    // Wrong block from the client.
    peer.send_packet(TFTPPacket::ACK(AckPacket::new(9)), worker)
        .await
        .unwrap();
    let (again, from) = expect_data(&peer).await;
    assert_eq!(from, worker);
    assert_eq!(again, first);

    // Right block, wrong endpoint.
    stranger
        .send_packet(TFTPPacket::ACK(AckPacket::new(1)), worker)
        .await
        .unwrap();
    let (again, _) = expect_data(&peer).await;
    assert_eq!(again, first);
    expect_silence(&stranger).await;

    // Two more mismatches make five transmissions; the next one ends it.
    for blk in [0u8, 2].iter() {
        peer.send_packet(TFTPPacket::ACK(AckPacket::new(*blk)), worker)
            .await
            .unwrap();
        let (again, _) = expect_data(&peer).await;
        assert_eq!(again, first);
    }
    peer.send_packet(TFTPPacket::ACK(AckPacket::new(3)), worker)
        .await
        .unwrap();
    expect_silence(&peer).await;

    server.shutdown().await;
}

#[async_std::test]
async fn client_reacks_duplicate_block_without_rewriting() {
    let peer = DataChannel::bind("127.0.0.1:0", Duration::from_secs(2))
        .await
        .unwrap();
    let addr = peer.local_addr().unwrap();
    let client = task::spawn(async move { fetch(addr, "foo", quick_client()).await });

    let client_addr = match expect_packet(&peer).await {
        (TFTPPacket::RRQ(rrq), from) => {
            assert_eq!(rrq.filename(), b"foo");
            from
        }
        (p, _) => panic!("expected RRQ, got {}", p),
    };

    let block1 = vec![b'a'; STRIDE_SIZE];
    let data1 = TFTPPacket::DATA(DataPacket::new(1, block1.clone())).serialize();
    peer.send_bytes(&data1, client_addr).await.unwrap();
    let (blk, _) = expect_ack(&peer).await;
    assert_eq!(blk, 1);

    // Pretend ACK 1 was lost and send block 1 again.
    peer.send_bytes(&data1, client_addr).await.unwrap();
    let (blk, _) = expect_ack(&peer).await;
    assert_eq!(blk, 1);

    peer.send_packet(TFTPPacket::DATA(DataPacket::new(2, b"tail".to_vec())), client_addr)
        .await
        .unwrap();
    let (blk, _) = expect_ack(&peer).await;
    assert_eq!(blk, 2);

    let (result, sink) = client.await;
    let summary = result.expect("download");

    let mut expected = block1;
    expected.extend_from_slice(b"tail");
    assert_eq!(sink, expected);
    assert_eq!(summary.blocks, 2);
    assert_eq!(summary.acks_sent, 3);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[async_std::test]
async fn missing_file_surfaces_server_error() {
    let server = start_server(MemoryStore::new()).await;

    let (result, sink) = fetch(server.local_addr(), "missing", quick_client()).await;

    match result {
        Err(ClientError::Remote(msg)) => assert_eq!(msg, "missing was not found."),
        other => panic!("expected a server error, got {:?}", other),
    }
    assert!(sink.is_empty());

    server.shutdown().await;
}

#[async_std::test]
async fn unanswered_request_times_out_without_retransmitting() {
    let peer = DataChannel::bind("127.0.0.1:0", Duration::from_secs(1))
        .await
        .unwrap();
    let addr = peer.local_addr().unwrap();
    let config = ClientConfig {
        timeout: Duration::from_millis(200),
    };

    let (result, sink) = fetch(addr, "foo", config).await;

    match result {
        Err(ClientError::Timeout(d)) => assert_eq!(d, Duration::from_millis(200)),
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(sink.is_empty());

    // Exactly one RRQ reached the silent server.
    match expect_packet(&peer).await {
        (TFTPPacket::RRQ(_), _) => {}
        (p, _) => panic!("expected RRQ, got {}", p),
    }
    expect_silence(&peer).await;
}

#[async_std::test]
async fn invalid_datagrams_get_no_reply() {
    let server = start_server(MemoryStore::new().with_file("foo", contents(10))).await;
    let peer = DataChannel::bind("127.0.0.1:0", Duration::from_millis(300))
        .await
        .unwrap();

    peer.send_bytes(&[66, 1, 2, 3], server.local_addr()).await.unwrap();
    peer.send_packet(TFTPPacket::ACK(AckPacket::new(1)), server.local_addr())
        .await
        .unwrap();
    expect_silence(&peer).await;

    // The dispatcher is still serving.
    let (result, sink) = fetch(server.local_addr(), "foo", quick_client()).await;
    result.expect("download");
    assert_eq!(sink, contents(10));

    server.shutdown().await;
}

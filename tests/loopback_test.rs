//! 루프백 전송 테스트 (실제 TCP/UDP 소켓)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc::UnboundedReceiver;

use lft::message::TcpHeaderFrame;
use lft::{ChannelNotifier, Client, Config, Error, Event, FileServer, NullNotifier, UdpMode};

struct Fixture {
    server: FileServer,
    events: UnboundedReceiver<Event>,
    port: u16,
    inbox: tempfile::TempDir,
    outbox: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let inbox = tempfile::tempdir().unwrap();
    let outbox = tempfile::tempdir().unwrap();
    let (notifier, events) = ChannelNotifier::new();
    let server = FileServer::new(Config::loopback(inbox.path()), Arc::new(notifier));
    server.start_receiving().unwrap();
    let port = server.local_addr().unwrap().port();

    Fixture {
        server,
        events,
        port,
        inbox,
        outbox,
    }
}

impl Fixture {
    fn write_file(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.outbox.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn received(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.inbox.path().join(name)).unwrap()
    }

    /// `name` 이벤트가 `count`번 나올 때까지 수집
    async fn wait_for(&mut self, name: &str, count: usize) -> Vec<Event> {
        let mut seen = Vec::new();
        let collect = async {
            while seen.iter().filter(|e: &&Event| e.name() == name).count() < count {
                match self.events.recv().await {
                    Some(event) => seen.push(event),
                    None => break,
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(10), collect)
            .await
            .unwrap_or_else(|_| panic!("{} x{} 대기 타임아웃", name, count));
        seen
    }
}

fn client(config: Config) -> Client {
    Client::new(config, Arc::new(NullNotifier))
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill(&mut data[..]);
    data
}

fn client_config(dir: &Path) -> Config {
    Config::loopback(dir)
}

#[tokio::test]
async fn test_tcp_batch_roundtrip() {
    let mut fx = fixture();
    let big = random_bytes(50_000);
    let exact = random_bytes(1014 * 3);
    let paths = vec![
        fx.write_file("big.bin", &big),
        fx.write_file("empty.bin", b""),
        fx.write_file("exact.bin", &exact),
    ];

    let sender = client(client_config(fx.outbox.path()));
    let message = sender
        .send_files("127.0.0.1", fx.port, true, &paths)
        .await
        .unwrap();
    assert_eq!(message, "Files sent successfully");

    let events = fx.wait_for("reception-finished", 3).await;
    assert!(!events.iter().any(|e| e.name() == "server-error"));
    assert_eq!(fx.received("big.bin"), big);
    assert_eq!(fx.received("empty.bin"), b"");
    assert_eq!(fx.received("exact.bin"), exact);

    fx.server.stop_receiving().await;
}

#[tokio::test]
async fn test_udp_segment_boundary_file() {
    let mut fx = fixture();
    let data = random_bytes(2048);
    let path = fx.write_file("two.bin", &data);

    let sender = client(client_config(fx.outbox.path()));
    let reports = sender
        .transfer("127.0.0.1", fx.port, false, &[path])
        .await
        .unwrap();

    // 2048 / 1024 + 1 = 3 세그먼트 선언, 실제 데이터 패킷은 2개
    assert_eq!(reports[0].total_segments, 3);
    assert_eq!(reports[0].completed_segments, 2);
    assert_eq!(reports[0].retransmitted_packets, 0);

    fx.wait_for("reception-finished", 1).await;
    assert_eq!(fx.received("two.bin"), data);
    fx.server.stop_receiving().await;
}

#[tokio::test]
async fn test_udp_retry_exhausted_without_server() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lost.bin");
    std::fs::write(&path, b"never arrives").unwrap();

    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();

    let mut config = client_config(dir.path());
    config.ack_timeout_ms = 50;
    let (notifier, mut events) = ChannelNotifier::new();
    let sender = Client::new(config, Arc::new(notifier));

    let err = sender
        .send_files("127.0.0.1", port, false, &[path])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RetryExhausted {
            ack_number: 0,
            attempts: 5
        }
    ));

    let mut starts = 0;
    let mut buf = [0u8; 2048];
    while let Ok(Ok(n)) =
        tokio::time::timeout(Duration::from_millis(50), silent.recv(&mut buf)).await
    {
        assert_eq!(buf[0], 1);
        assert!(n > 13);
        starts += 1;
    }
    assert_eq!(starts, 5);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names, ["sending-file-start", "client-error"]);
}

#[tokio::test]
async fn test_udp_recovers_after_downtime() {
    let mut fx = fixture();
    let data = random_bytes(5000);
    let path = fx.write_file("flaky.bin", &data);

    let mut config = client_config(fx.outbox.path());
    config.ack_timeout_ms = 100;
    config.max_attempts = 10;
    let sender = Arc::new(client(config));

    sender.set_downtime(true);
    let lift = {
        let sender = sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            sender.set_downtime(false);
        })
    };

    let reports = sender
        .transfer("127.0.0.1", fx.port, false, &[path])
        .await
        .unwrap();
    lift.await.unwrap();
    assert!(reports[0].retransmitted_packets >= 1);

    fx.wait_for("reception-finished", 1).await;
    assert_eq!(fx.received("flaky.bin"), data);
    fx.server.stop_receiving().await;
}

#[tokio::test]
async fn test_udp_best_effort_over_loopback() {
    let mut fx = fixture();
    let data = random_bytes(20_000);
    let path = fx.write_file("fast.bin", &data);

    let mut config = client_config(fx.outbox.path());
    config.udp_mode = UdpMode::BestEffort;
    client(config)
        .send_files("127.0.0.1", fx.port, false, &[path])
        .await
        .unwrap();

    fx.wait_for("reception-finished", 1).await;
    assert_eq!(fx.received("fast.bin"), data);
    fx.server.stop_receiving().await;
}

#[tokio::test]
async fn test_concurrent_udp_clients_do_not_mix() {
    let mut fx = fixture();
    let first = random_bytes(12_000);
    let second = random_bytes(9_000);
    let first_path = fx.write_file("first.bin", &first);
    let second_path = fx.write_file("second.bin", &second);

    let a = client(client_config(fx.outbox.path()));
    let b = client(client_config(fx.outbox.path()));
    let first_paths = [first_path];
    let second_paths = [second_path];
    let (ra, rb) = tokio::join!(
        a.send_files("127.0.0.1", fx.port, false, &first_paths),
        b.send_files("127.0.0.1", fx.port, false, &second_paths),
    );
    ra.unwrap();
    rb.unwrap();

    let events = fx.wait_for("reception-finished", 2).await;
    assert!(!events.iter().any(|e| e.name() == "server-error"));
    assert_eq!(fx.received("first.bin"), first);
    assert_eq!(fx.received("second.bin"), second);
    fx.server.stop_receiving().await;
}

#[tokio::test]
async fn test_wrong_checksum_reports_server_error() {
    let mut fx = fixture();
    let mut stream = TcpStream::connect(("127.0.0.1", fx.port)).await.unwrap();

    let header = TcpHeaderFrame {
        segment_count: 1,
        name: "tampered.txt".into(),
        checksum: "ffffffffffffffffffffffffffffffff".into(),
    };
    stream.write_all(&header.to_bytes()).await.unwrap();
    let mut buf = [0u8; 128];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"Header received for tampered.txt");

    stream
        .write_all(&lft::TcpSegmentFrame::new(0, bytes::Bytes::from_static(b"payload")).to_bytes())
        .await
        .unwrap();
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"Segment 0 received");

    let events = fx.wait_for("server-error", 1).await;
    assert!(!events.iter().any(|e| e.name() == "reception-finished"));
    assert_eq!(fx.received("tampered.txt"), b"payload");
    fx.server.stop_receiving().await;
}

#[tokio::test]
async fn test_stop_closes_open_connection() {
    let fx = fixture();
    let mut stream = TcpStream::connect(("127.0.0.1", fx.port)).await.unwrap();

    let registered = async {
        while fx.server.active_connections() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), registered)
        .await
        .unwrap();

    fx.server.stop_receiving().await;
    assert!(!fx.server.is_listening());
    assert_eq!(fx.server.active_connections(), 0);

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    // 리스너도 닫혀 있어야 함
    assert!(TcpStream::connect(("127.0.0.1", fx.port)).await.is_err());
}

#[tokio::test]
async fn test_restart_after_stop() {
    let mut fx = fixture();
    fx.server.stop_receiving().await;
    fx.server.stop_receiving().await;

    fx.server.start_receiving().unwrap();
    assert!(matches!(
        fx.server.start_receiving(),
        Err(Error::AlreadyListening)
    ));
    let port = fx.server.local_addr().unwrap().port();

    let path = fx.write_file("again.txt", b"second life");
    client(client_config(fx.outbox.path()))
        .send_files("127.0.0.1", port, true, &[path])
        .await
        .unwrap();

    fx.wait_for("reception-finished", 1).await;
    assert_eq!(fx.received("again.txt"), b"second life");
    fx.server.stop_receiving().await;
}

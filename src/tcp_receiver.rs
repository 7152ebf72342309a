//! TCP 수신자 (서버측, 연결당 워커)
//!
//! - 연결 하나에서 여러 파일을 순서대로 수신 (상대가 닫을 때까지)
//! - 구분 바이트 불일치는 재동기화 없이 연결 종료
//! - 인덱스가 기대값보다 작으면 중복으로 보고 기록하지 않음

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::message::{
    tcp_header_ack, tcp_segment_ack, TcpHeaderFields, TcpSegmentPrefix, TCP_HEADER_FIELDS_LEN,
    TCP_HEADER_START, TCP_SEGMENT_PREFIX_LEN,
};
use crate::notify::{Event, Notifier};
use crate::session::{SegmentOutcome, TransferSession};
use crate::{Error, Result, TCP_SEGMENT_SIZE};

/// TCP 수신자
#[derive(Clone)]
pub struct TcpReceiver {
    receive_dir: PathBuf,
    notifier: Arc<dyn Notifier>,
}

impl TcpReceiver {
    pub fn new(receive_dir: PathBuf, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            receive_dir,
            notifier,
        }
    }

    /// 연결 하나를 상대가 닫을 때까지 처리
    ///
    /// 받은 파일 수를 돌려준다. 체크섬 불일치는 보고만 하고 다음 헤더를 기다린다.
    pub async fn serve<S>(&self, mut stream: S, peer: SocketAddr) -> Result<u32>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!("TCP 연결 수락: {}, 파일 대기 중", peer);
        let mut files = 0u32;

        loop {
            let mut kind = [0u8; 1];
            if stream.read(&mut kind).await? == 0 {
                info!("클라이언트 연결 종료: {} ({} files)", peer, files);
                return Ok(files);
            }

            match self.receive_file(&mut stream, kind[0]).await {
                Ok(()) => files += 1,
                Err(Error::ChecksumMismatch { .. }) => files += 1,
                Err(e) => {
                    warn!("TCP 연결 {} 중단: {}", peer, e);
                    self.notifier.notify(Event::ServerError {
                        message: format!("Connection from {} aborted: {}", peer, e),
                    });
                    return Err(e);
                }
            }
        }
    }

    async fn receive_file<S>(&self, stream: &mut S, kind: u8) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if kind != TCP_HEADER_START {
            return Err(Error::InvalidSentinel {
                frame: "header",
                expected: TCP_HEADER_START,
                got: kind,
            });
        }

        let mut block = [0u8; TCP_HEADER_FIELDS_LEN];
        stream.read_exact(&mut block).await?;
        let fields = TcpHeaderFields::parse(&block)?;

        let mut body = vec![0u8; fields.body_len()];
        stream.read_exact(&mut body).await?;
        let header = fields.finish(&body)?;

        info!(
            "TCP 수신 시작: {} ({} segments)",
            header.name, header.segment_count
        );

        let mut session = TransferSession::open(
            &self.receive_dir,
            &header.name,
            header.segment_count,
            header.checksum,
            0,
            TCP_SEGMENT_SIZE,
        )
        .await?;

        self.notifier.notify(Event::ReceptionStarted {
            file_name: session.name().to_owned(),
        });
        stream
            .write_all(tcp_header_ack(session.name()).as_bytes())
            .await?;

        let mut prefix_buf = [0u8; TCP_SEGMENT_PREFIX_LEN];
        let mut body_buf = vec![0u8; TCP_SEGMENT_SIZE + 1];
        let mut iteration = 0u32;

        while iteration < header.segment_count {
            stream.read_exact(&mut prefix_buf).await?;
            let prefix = TcpSegmentPrefix::parse(&prefix_buf)?;

            let body = &mut body_buf[..prefix.body_len()];
            stream.read_exact(body).await?;
            let segment = prefix.finish(body)?;

            match session.accept(segment.index, &segment.data).await? {
                SegmentOutcome::Written => {
                    // ACK 번호는 반복 카운터
                    stream
                        .write_all(tcp_segment_ack(iteration).as_bytes())
                        .await?;
                    iteration += 1;
                }
                SegmentOutcome::Duplicate => {
                    debug!("TCP 중복 세그먼트 {} 재확인", segment.index);
                    stream
                        .write_all(tcp_segment_ack(segment.index).as_bytes())
                        .await?;
                }
                SegmentOutcome::OutOfOrder => {
                    return Err(Error::SequenceGap {
                        expected: session.expected_index(),
                        got: segment.index,
                    });
                }
            }

            self.notifier.notify(session.progress_event());
        }

        let file = session.close().await?;
        file.verify_and_report(self.notifier.as_ref(), "TCP").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity;
    use crate::message::{TcpHeaderFrame, TcpSegmentFrame};
    use crate::notify::ChannelNotifier;
    use crate::tcp_sender::TcpSender;
    use crate::Config;
    use bytes::Bytes;
    use tokio::io::DuplexStream;
    use tokio::sync::{mpsc, watch};

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn receiver(dir: &std::path::Path) -> (TcpReceiver, mpsc::UnboundedReceiver<Event>) {
        let (notifier, rx) = ChannelNotifier::new();
        (TcpReceiver::new(dir.to_path_buf(), Arc::new(notifier)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn exchange(stream: &mut DuplexStream, frame: &[u8]) -> String {
        stream.write_all(frame).await.unwrap();
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn test_send_and_receive_over_stream() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();
        let path = src.path().join("payload.bin");
        tokio::fs::write(&path, &data).await.unwrap();

        let (receiver, mut rx) = receiver(dst.path());
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let worker = tokio::spawn(async move { receiver.serve(server, peer()).await });

        let (_down_tx, down_rx) = watch::channel(false);
        let sender = TcpSender::new(Config::default(), Arc::new(crate::NullNotifier), down_rx);
        let stats = sender.send_file(&mut client, &path).await.unwrap();
        assert_eq!(stats.completed_segments, 5);
        drop(client);

        assert_eq!(worker.await.unwrap().unwrap(), 1);
        let received = tokio::fs::read(dst.path().join("payload.bin")).await.unwrap();
        assert_eq!(received, data);

        let events = drain(&mut rx);
        assert_eq!(events.first().unwrap().name(), "reception-started");
        assert_eq!(events.last().unwrap().name(), "reception-finished");
    }

    #[tokio::test]
    async fn test_duplicate_segment_acked_not_written() {
        let dst = tempfile::tempdir().unwrap();
        let (receiver, mut rx) = receiver(dst.path());
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let worker = tokio::spawn(async move { receiver.serve(server, peer()).await });

        let first = vec![b'a'; TCP_SEGMENT_SIZE];
        let second = b"tail".to_vec();
        let mut whole = first.clone();
        whole.extend_from_slice(&second);

        let header = TcpHeaderFrame {
            segment_count: 2,
            name: "dup.bin".into(),
            checksum: integrity::digest_bytes(&whole),
        };
        assert_eq!(
            exchange(&mut client, &header.to_bytes()).await,
            "Header received for dup.bin"
        );

        let seg0 = TcpSegmentFrame::new(0, Bytes::from(first)).to_bytes();
        assert_eq!(exchange(&mut client, &seg0).await, "Segment 0 received");
        assert_eq!(exchange(&mut client, &seg0).await, "Segment 0 received");

        let seg1 = TcpSegmentFrame::new(1, Bytes::from(second)).to_bytes();
        assert_eq!(exchange(&mut client, &seg1).await, "Segment 1 received");
        drop(client);

        assert_eq!(worker.await.unwrap().unwrap(), 1);
        let received = tokio::fs::read(dst.path().join("dup.bin")).await.unwrap();
        assert_eq!(received, whole);

        let events = drain(&mut rx);
        assert!(events.contains(&Event::ReceivingFileProgress {
            received: 1,
            total: 2,
            duplicate_count: 1,
        }));
        assert_eq!(events.last().unwrap().name(), "reception-finished");
    }

    #[tokio::test]
    async fn test_bad_header_sentinel_aborts_connection() {
        let dst = tempfile::tempdir().unwrap();
        let (receiver, mut rx) = receiver(dst.path());
        let (mut client, server) = tokio::io::duplex(1024);
        let worker = tokio::spawn(async move { receiver.serve(server, peer()).await });

        client.write_all(&[0x05, 0, 0, 0]).await.unwrap();

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::InvalidSentinel { got: 0x05, .. }));
        assert_eq!(drain(&mut rx).last().unwrap().name(), "server-error");
    }

    #[tokio::test]
    async fn test_segment_gap_aborts_connection() {
        let dst = tempfile::tempdir().unwrap();
        let (receiver, _rx) = receiver(dst.path());
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let worker = tokio::spawn(async move { receiver.serve(server, peer()).await });

        let header = TcpHeaderFrame {
            segment_count: 3,
            name: "gap.bin".into(),
            checksum: String::new(),
        };
        exchange(&mut client, &header.to_bytes()).await;
        client
            .write_all(&TcpSegmentFrame::new(2, Bytes::from_static(b"x")).to_bytes())
            .await
            .unwrap();

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::SequenceGap { expected: 0, got: 2 }));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_keeps_connection() {
        let dst = tempfile::tempdir().unwrap();
        let (receiver, mut rx) = receiver(dst.path());
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let worker = tokio::spawn(async move { receiver.serve(server, peer()).await });

        for (name, checksum) in [
            ("bad.txt", "00000000000000000000000000000000".to_owned()),
            ("good.txt", integrity::digest_bytes(b"data")),
        ] {
            let header = TcpHeaderFrame {
                segment_count: 1,
                name: name.into(),
                checksum,
            };
            exchange(&mut client, &header.to_bytes()).await;
            exchange(
                &mut client,
                &TcpSegmentFrame::new(0, Bytes::from_static(b"data")).to_bytes(),
            )
            .await;
        }
        drop(client);

        assert_eq!(worker.await.unwrap().unwrap(), 2);
        let names: Vec<&str> = drain(&mut rx)
            .iter()
            .filter(|e| !matches!(e, Event::ReceivingFileProgress { .. }))
            .map(Event::name)
            .collect();
        assert_eq!(
            names,
            [
                "reception-started",
                "server-error",
                "reception-started",
                "reception-finished"
            ]
        );
        assert!(dst.path().join("bad.txt").exists());
    }
}

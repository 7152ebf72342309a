//! UDP 송신자 (클라이언트측)
//!
//! - 패킷마다 ACK 번호를 확인하는 stop-and-wait
//! - 시도당 타임아웃 + 제한된 재시도, 초과 시 해당 파일 실패
//! - BestEffort 모드: ACK 없이 연속 전송 (에러는 기록만 함)
//!
//! ACK 번호: 시작 = 0, 데이터 seq = seq, 종료 = totalSegments + 1

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::resolve;
use crate::config::UdpMode;
use crate::message::{AckFrame, UdpFrame};
use crate::notify::{Event, Notifier};
use crate::segment::{FileMetadata, SegmentReader};
use crate::stats::TransferStats;
use crate::tcp_sender::display_name;
use crate::{Config, Error, Result, UDP_SEGMENT_SIZE};

/// UDP 송신자
pub struct UdpSender {
    config: Config,
    notifier: Arc<dyn Notifier>,
    downtime: watch::Receiver<bool>,
}

impl UdpSender {
    pub fn new(
        config: Config,
        notifier: Arc<dyn Notifier>,
        downtime: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            notifier,
            downtime,
        }
    }

    /// 파일 목록을 순서대로 전송
    ///
    /// Reliable 모드에서는 첫 실패에서 배치를 중단한다.
    /// BestEffort 모드에서는 실패를 보고하고 다음 파일로 넘어간다.
    pub async fn send_batch(
        &self,
        address: &str,
        port: u16,
        paths: &[PathBuf],
    ) -> Result<Vec<TransferStats>> {
        let target = resolve(address, port).await.map_err(|e| {
            self.notifier.notify(Event::ClientError {
                message: format!("Error resolving UDP address {}:{}", address, port),
            });
            e
        })?;

        let socket = connect_socket(target).await.map_err(|e| {
            self.notifier.notify(Event::ClientError {
                message: format!("Could not connect (UDP): {}", e),
            });
            e
        })?;
        info!(
            "UDP 송신 시작: {} ({} files, {:?})",
            target,
            paths.len(),
            self.config.udp_mode
        );

        let total_files = paths.len();
        let mut reports = Vec::with_capacity(total_files);

        for (i, path) in paths.iter().enumerate() {
            self.notifier.notify(Event::SendingFileStart {
                file_name: display_name(path),
                current_file: i + 1,
                total_files,
            });

            let result = match self.config.udp_mode {
                UdpMode::Reliable => self.send_file(&socket, path).await,
                UdpMode::BestEffort => self.send_file_best_effort(&socket, path).await,
            };

            match result {
                Ok(stats) => {
                    info!("UDP 전송 완료: {}", stats.summary());
                    reports.push(stats);
                }
                Err(e) => {
                    warn!("UDP 전송 실패 {:?}: {}", path, e);
                    self.notifier.notify(Event::ClientError {
                        message: format!("Error sending {}: {}", display_name(path), e),
                    });
                    if self.config.udp_mode == UdpMode::Reliable {
                        return Err(e);
                    }
                }
            }
        }

        self.notifier.notify(Event::ReceptionFinished {
            message: "All files sent successfully".to_owned(),
        });
        Ok(reports)
    }

    /// 연결된 소켓으로 파일 하나를 신뢰성 있게 전송
    pub async fn send_file(&self, socket: &UdpSocket, path: &Path) -> Result<TransferStats> {
        let mut file = File::open(path).await?;
        let meta = FileMetadata::from_file(&mut file, path, UDP_SEGMENT_SIZE).await?;
        let mut stats = TransferStats::new(meta.name.clone(), meta.segment_count);

        let start = UdpFrame::start(&meta);
        let retries = self.send_and_wait_for_ack(socket, &start).await?;
        stats.record_retransmits(retries);

        let mut reader = SegmentReader::new(file, UDP_SEGMENT_SIZE, 1);
        for _ in 0..meta.segment_count {
            let segment = reader.next_segment().await?;
            if segment.is_empty() {
                break;
            }

            let len = segment.len();
            let data = UdpFrame::Data {
                seq: segment.index,
                payload: segment.payload,
            };
            let retries = self.send_and_wait_for_ack(socket, &data).await?;
            stats.record_retransmits(retries);
            stats.record_segment(len);

            self.notifier.notify(Event::SendingFileProgress {
                sent: segment.index,
                total: meta.segment_count,
            });
        }

        let end = UdpFrame::end(meta.segment_count);
        let retries = self.send_and_wait_for_ack(socket, &end).await?;
        stats.record_retransmits(retries);

        stats.finish();
        Ok(stats)
    }

    /// 패킷 전송 후 기대 ACK를 기다림
    ///
    /// 시도마다 `ack_timeout` 동안 기다리며, 번호가 다른 ACK는 지난 ACK로 보고 무시한다.
    /// 성공 시 재전송 횟수를 돌려준다.
    pub async fn send_and_wait_for_ack(&self, socket: &UdpSocket, frame: &UdpFrame) -> Result<u32> {
        let packet = frame.to_bytes();
        let expected = frame.expected_ack();
        let attempts = self.config.max_attempts.max(1);
        let mut buf = [0u8; 64];

        for attempt in 1..=attempts {
            if self.is_down() {
                debug!("다운타임: 패킷 폐기 (ack {})", expected);
            } else {
                socket.send(&packet).await?;
            }

            let deadline = Instant::now() + self.config.ack_timeout();
            loop {
                match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
                    Err(_) => break,
                    Ok(Ok(n)) => match AckFrame::from_bytes(&buf[..n]) {
                        Ok(ack) if ack.number == expected => return Ok(attempt - 1),
                        Ok(ack) => debug!("지난 ACK 무시: {} (expected {})", ack.number, expected),
                        Err(e) => debug!("ACK 파싱 실패: {}", e),
                    },
                    // 연결된 UDP 소켓의 ICMP 도달 불가는 손실로 취급
                    Ok(Err(e))
                        if matches!(
                            e.kind(),
                            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
                        ) =>
                    {
                        debug!("ACK 수신 에러 (손실 처리): {}", e);
                    }
                    Ok(Err(e)) => return Err(e.into()),
                }
            }

            warn!(
                "ACK {} 타임아웃 ({}/{}), {:?} 재전송",
                expected,
                attempt,
                attempts,
                frame.frame_type()
            );
        }

        Err(Error::RetryExhausted {
            ack_number: expected,
            attempts,
        })
    }

    /// ACK 없이 연속 전송
    async fn send_file_best_effort(&self, socket: &UdpSocket, path: &Path) -> Result<TransferStats> {
        let mut file = File::open(path).await?;
        let meta = FileMetadata::from_file(&mut file, path, UDP_SEGMENT_SIZE).await?;
        let mut stats = TransferStats::new(meta.name.clone(), meta.segment_count);

        socket.send(&UdpFrame::start(&meta).to_bytes()).await?;

        let mut reader = SegmentReader::new(file, UDP_SEGMENT_SIZE, 1);
        for _ in 0..meta.segment_count {
            let segment = reader.next_segment().await?;
            if segment.is_empty() {
                break;
            }

            let seq = segment.index;
            let len = segment.len();
            let data = UdpFrame::Data {
                seq,
                payload: segment.payload,
            };
            if self.is_down() {
                debug!("다운타임: 세그먼트 {} 폐기", seq);
            } else if let Err(e) = socket.send(&data.to_bytes()).await {
                warn!("세그먼트 {} 전송 에러: {}", seq, e);
            }
            stats.record_segment(len);

            self.notifier.notify(Event::SendingFileProgress {
                sent: seq,
                total: meta.segment_count,
            });
            tokio::time::sleep(self.config.best_effort_pacing()).await;
        }

        if let Err(e) = socket.send(&UdpFrame::end(meta.segment_count).to_bytes()).await {
            warn!("종료 패킷 전송 에러: {}", e);
        }

        stats.finish();
        Ok(stats)
    }

    fn is_down(&self) -> bool {
        *self.downtime.borrow()
    }
}

/// 대상 주소 패밀리에 맞는 임시 포트 소켓을 열고 connect
async fn connect_socket(target: SocketAddr) -> Result<UdpSocket> {
    let local = match target.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };

    let socket = UdpSocket::bind(local)
        .await
        .map_err(|e| Error::transport(format!("bind {}", local), e))?;
    socket
        .connect(target)
        .await
        .map_err(|e| Error::transport(format!("connect {}", target), e))?;
    Ok(socket)
}

//! UDP 수신자 (서버측, 단일 수신 루프)
//!
//! 세션은 송신자 주소별로 구분한다. 서로 다른 클라이언트의 동시 전송이
//! 섞이지 않고, 한 클라이언트의 재시작은 그 클라이언트의 세션만 초기화한다.
//!
//! ACK 규칙: 시작 → 0, 데이터 → 받은 seq, 종료 → totalSegments + 1

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::{AckFrame, UdpFrame};
use crate::notify::{Event, Notifier};
use crate::session::{SegmentOutcome, TransferSession};
use crate::{Result, UDP_SEGMENT_SIZE};

/// 만료 세션 점검 주기
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct UdpSession {
    session: TransferSession,
    last_activity: Instant,
}

/// UDP 수신자
pub struct UdpReceiver {
    receive_dir: PathBuf,
    notifier: Arc<dyn Notifier>,
    idle_timeout: Duration,
    recv_buffer_size: usize,
    sessions: HashMap<SocketAddr, UdpSession>,
}

impl UdpReceiver {
    pub fn new(
        receive_dir: PathBuf,
        notifier: Arc<dyn Notifier>,
        idle_timeout: Duration,
        recv_buffer_size: usize,
    ) -> Self {
        Self {
            receive_dir,
            notifier,
            idle_timeout,
            recv_buffer_size,
            sessions: HashMap::new(),
        }
    }

    /// 진행 중인 세션 수
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 취소될 때까지 데이터그램 처리
    pub async fn run(mut self, socket: Arc<UdpSocket>, cancel: CancellationToken) -> Result<()> {
        info!("UDP 수신 루프 시작: {:?}", socket.local_addr().ok());
        let mut buf = vec![0u8; self.recv_buffer_size.max(UDP_SEGMENT_SIZE + 5)];
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break;
                }

                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, peer)) => {
                            self.handle_datagram(&socket, peer, &buf[..n]).await;
                        }
                        Err(e) => {
                            // 이전 ACK의 ICMP 도달 불가 등, 루프는 계속
                            debug!("UDP 수신 에러: {}", e);
                        }
                    }
                }

                _ = sweep.tick() => {
                    self.evict_idle().await;
                }
            }
        }

        if !self.sessions.is_empty() {
            warn!("UDP 수신 종료: 미완료 세션 {}개 폐기", self.sessions.len());
        }
        info!("UDP 수신 루프 종료");
        Ok(())
    }

    /// 데이터그램 하나 처리
    pub async fn handle_datagram(&mut self, socket: &UdpSocket, peer: SocketAddr, datagram: &[u8]) {
        let frame = match UdpFrame::from_bytes(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("UDP 프레임 파싱 실패 ({}): {}", peer, e);
                if let Some(entry) = self.sessions.remove(&peer) {
                    self.notifier.notify(Event::ServerError {
                        message: format!(
                            "UDP transfer of {} from {} aborted: {}",
                            entry.session.name(),
                            peer,
                            e
                        ),
                    });
                }
                return;
            }
        };

        match frame {
            UdpFrame::Start {
                total_segments,
                name,
                checksum,
            } => {
                self.handle_start(socket, peer, total_segments, &name, checksum)
                    .await;
            }
            UdpFrame::Data { seq, payload } => {
                self.handle_data(socket, peer, seq, &payload).await;
            }
            UdpFrame::End { final_seq } => {
                self.handle_end(socket, peer, final_seq).await;
            }
        }
    }

    async fn handle_start(
        &mut self,
        socket: &UdpSocket,
        peer: SocketAddr,
        total_segments: u32,
        name: &str,
        checksum: String,
    ) {
        if let Some(old) = self.sessions.remove(&peer) {
            warn!(
                "{}의 새 시작 패킷: 진행 중이던 {} 세션 초기화",
                peer,
                old.session.name()
            );
        }

        let session = match TransferSession::open(
            &self.receive_dir,
            name,
            total_segments,
            checksum,
            1,
            UDP_SEGMENT_SIZE,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("UDP 세션 생성 실패 ({}): {}", peer, e);
                self.notifier.notify(Event::ServerError {
                    message: format!("Could not create file {}: {}", name, e),
                });
                return;
            }
        };

        info!(
            "UDP 수신 시작: {} from {} ({} segments)",
            session.name(),
            peer,
            total_segments
        );
        self.notifier.notify(Event::ReceptionStarted {
            file_name: session.name().to_owned(),
        });
        self.sessions.insert(
            peer,
            UdpSession {
                session,
                last_activity: Instant::now(),
            },
        );

        send_ack(socket, peer, 0).await;
    }

    async fn handle_data(&mut self, socket: &UdpSocket, peer: SocketAddr, seq: u32, payload: &[u8]) {
        let Some(entry) = self.sessions.get_mut(&peer) else {
            debug!("세션 없는 데이터 패킷 무시: seq {} from {}", seq, peer);
            return;
        };
        entry.last_activity = Instant::now();

        match entry.session.accept(seq, payload).await {
            Ok(SegmentOutcome::Written) | Ok(SegmentOutcome::Duplicate) => {}
            Ok(SegmentOutcome::OutOfOrder) => {
                debug!(
                    "순서 밖 세그먼트 {} (expected {}), 기록하지 않음",
                    seq,
                    entry.session.expected_index()
                );
            }
            Err(e) => {
                let name = entry.session.name().to_owned();
                self.sessions.remove(&peer);
                warn!("UDP 세그먼트 기록 실패 ({}): {}", name, e);
                self.notifier.notify(Event::ServerError {
                    message: format!("UDP transfer of {} from {} aborted: {}", name, peer, e),
                });
                return;
            }
        }

        // 결과와 관계없이 받은 seq로 ACK
        send_ack(socket, peer, seq).await;
        self.notifier.notify(entry.session.progress_event());
    }

    async fn handle_end(&mut self, socket: &UdpSocket, peer: SocketAddr, final_seq: u32) {
        let Some(entry) = self.sessions.remove(&peer) else {
            // 종료 ACK 유실 후 재전송된 종료 패킷
            debug!("세션 없는 종료 패킷 재확인: {} from {}", final_seq, peer);
            send_ack(socket, peer, final_seq).await;
            return;
        };

        let expected_end = entry.session.total_segments().wrapping_add(1);
        if final_seq != expected_end {
            debug!("종료 번호 불일치: {} (expected {})", final_seq, expected_end);
        }
        send_ack(socket, peer, expected_end).await;

        let file = match entry.session.close().await {
            Ok(file) => file,
            Err(e) => {
                self.notifier.notify(Event::ServerError {
                    message: format!("Could not finish UDP file from {}: {}", peer, e),
                });
                return;
            }
        };

        // 불일치는 verify_and_report 안에서 보고됨
        let _ = file.verify_and_report(self.notifier.as_ref(), "UDP").await;
    }

    /// 비활성 세션 만료
    async fn evict_idle(&mut self) {
        let now = Instant::now();
        let idle: Vec<SocketAddr> = self
            .sessions
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_activity) >= self.idle_timeout)
            .map(|(peer, _)| *peer)
            .collect();

        for peer in idle {
            if let Some(entry) = self.sessions.remove(&peer) {
                warn!("UDP 세션 만료: {} from {}", entry.session.name(), peer);
                self.notifier.notify(Event::ServerError {
                    message: format!(
                        "UDP transfer of {} from {} timed out",
                        entry.session.name(),
                        peer
                    ),
                });
            }
        }
    }
}

async fn send_ack(socket: &UdpSocket, peer: SocketAddr, number: u32) {
    if let Err(e) = socket.send_to(&AckFrame::new(number).to_bytes(), peer).await {
        warn!("ACK {} 전송 실패 ({}): {}", number, peer, e);
    }
}

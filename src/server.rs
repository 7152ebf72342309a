//! 파일 수신 서버 (수명주기 관리)
//!
//! 같은 포트 번호로 TCP 리스너와 UDP 소켓을 열고, 멈출 때는
//! 리스너와 진행 중인 모든 연결을 함께 닫는다.
//!
//! 상태는 `Idle` ↔ `Listening` 두 가지이며 전이는 잠금 안에서만 일어난다.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener as StdTcpListener, UdpSocket as StdUdpSocket};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::notify::Notifier;
use crate::tcp_receiver::TcpReceiver;
use crate::udp_receiver::UdpReceiver;
use crate::{Config, Error, Result};

/// 임시 포트 사용 시 TCP/UDP 같은 번호 바인드 재시도 횟수
const EPHEMERAL_BIND_ATTEMPTS: usize = 8;

enum Phase {
    Idle,
    Listening {
        local_addr: SocketAddr,
        cancel: CancellationToken,
        tcp_task: JoinHandle<()>,
        udp_task: JoinHandle<()>,
    },
}

struct TrackedConnection {
    peer: SocketAddr,
    cancel: CancellationToken,
}

struct ListenerState {
    phase: Phase,
    connections: HashMap<u64, TrackedConnection>,
    next_id: u64,
}

/// 파일 수신 서버
pub struct FileServer {
    config: Config,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<ListenerState>>,
}

impl FileServer {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            notifier,
            state: Arc::new(Mutex::new(ListenerState {
                phase: Phase::Idle,
                connections: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// 수신 시작
    ///
    /// 이미 수신 중이면 `AlreadyListening`을 돌려주고 기존 리스너는 그대로 둔다.
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn start_receiving(&self) -> Result<String> {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Listening { .. }) {
            warn!("이미 수신 중, 시작 요청 무시");
            return Err(Error::AlreadyListening);
        }

        let (tcp, udp) = bind_pair(&self.config)?;
        let local_addr = tcp
            .local_addr()
            .map_err(|e| Error::transport("listener address", e))?;

        let tcp = TcpListener::from_std(tcp)
            .map_err(|e| Error::transport(format!("TCP listen {}", local_addr), e))?;
        let udp = UdpSocket::from_std(udp)
            .map_err(|e| Error::transport(format!("UDP bind {}", local_addr), e))?;

        let cancel = CancellationToken::new();

        let tcp_task = tokio::spawn(accept_loop(
            tcp,
            TcpReceiver::new(self.config.receive_dir.clone(), self.notifier.clone()),
            self.state.clone(),
            cancel.clone(),
        ));

        let receiver = UdpReceiver::new(
            self.config.receive_dir.clone(),
            self.notifier.clone(),
            self.config.session_idle_timeout(),
            self.config.recv_buffer_size,
        );
        let udp_cancel = cancel.clone();
        let udp_task = tokio::spawn(async move {
            if let Err(e) = receiver.run(Arc::new(udp), udp_cancel).await {
                error!("UDP 수신 루프 에러: {}", e);
            }
        });

        state.phase = Phase::Listening {
            local_addr,
            cancel,
            tcp_task,
            udp_task,
        };
        info!("Listening on {} (TCP + UDP)", local_addr);
        Ok(format!("Listening on port {}", local_addr.port()))
    }

    /// 수신 중지
    ///
    /// 리스너와 모든 활성 연결을 닫고 종료를 기다린다. 대기 중이 아니면 아무것도 하지 않는다.
    pub async fn stop_receiving(&self) {
        let (tcp_task, udp_task) = {
            let mut state = self.state.lock();
            let phase = std::mem::replace(&mut state.phase, Phase::Idle);
            let Phase::Listening {
                cancel,
                tcp_task,
                udp_task,
                local_addr,
            } = phase
            else {
                debug!("수신 중이 아님, 중지 요청 무시");
                return;
            };

            info!("수신 중지: {}", local_addr);
            cancel.cancel();
            for (_, conn) in state.connections.drain() {
                debug!("연결 종료: {}", conn.peer);
                conn.cancel.cancel();
            }
            (tcp_task, udp_task)
        };

        if let Err(e) = tcp_task.await {
            warn!("TCP 수락 태스크 종료 에러: {}", e);
        }
        if let Err(e) = udp_task.await {
            warn!("UDP 수신 태스크 종료 에러: {}", e);
        }
        info!("수신 중지 완료");
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Listening { .. })
    }

    /// 수신 중인 주소 (임시 포트 확인용)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.state.lock().phase {
            Phase::Listening { local_addr, .. } => Some(local_addr),
            Phase::Idle => None,
        }
    }

    /// 활성 TCP 연결 수
    pub fn active_connections(&self) -> usize {
        self.state.lock().connections.len()
    }
}

/// 같은 포트 번호로 TCP 리스너와 UDP 소켓 바인드
fn bind_pair(config: &Config) -> Result<(StdTcpListener, StdUdpSocket)> {
    let requested = SocketAddr::new(config.bind_ip, config.port);
    let attempts = if config.port == 0 {
        EPHEMERAL_BIND_ATTEMPTS
    } else {
        1
    };

    let mut last_error = None;
    for _ in 0..attempts {
        let tcp = StdTcpListener::bind(requested)
            .map_err(|e| Error::transport(format!("TCP listen {}", requested), e))?;
        let addr = tcp
            .local_addr()
            .map_err(|e| Error::transport("listener address", e))?;

        match StdUdpSocket::bind(addr) {
            Ok(udp) => {
                tcp.set_nonblocking(true)?;
                udp.set_nonblocking(true)?;
                return Ok((tcp, udp));
            }
            Err(e) => {
                debug!("UDP 바인드 실패 {}: {}", addr, e);
                last_error = Some(Error::transport(format!("UDP bind {}", addr), e));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        Error::transport(
            format!("bind {}", requested),
            std::io::Error::from(std::io::ErrorKind::AddrInUse),
        )
    }))
}

/// 연결 수락 루프
async fn accept_loop(
    listener: TcpListener,
    receiver: TcpReceiver,
    state: Arc<Mutex<ListenerState>>,
    cancel: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("TCP 수락 에러: {}", e);
                    continue;
                }
            },
        };

        let Some(guard) = ConnectionGuard::register(&state, peer) else {
            debug!("중지 중 수락된 연결 거절: {}", peer);
            continue;
        };

        let receiver = receiver.clone();
        tokio::spawn(async move {
            let token = guard.token.clone();
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("연결 취소: {}", peer);
                }
                result = receiver.serve(stream, peer) => {
                    if let Err(e) = result {
                        debug!("연결 종료 ({}): {}", peer, e);
                    }
                }
            }
            drop(guard);
        });
    }

    info!("TCP 수락 루프 종료");
}

/// 연결 등록 해제 가드
struct ConnectionGuard {
    id: u64,
    token: CancellationToken,
    state: Arc<Mutex<ListenerState>>,
}

impl ConnectionGuard {
    /// 수신 중일 때만 등록
    fn register(state: &Arc<Mutex<ListenerState>>, peer: SocketAddr) -> Option<Self> {
        let mut guard = state.lock();
        let Phase::Listening { cancel, .. } = &guard.phase else {
            return None;
        };
        let token = cancel.child_token();

        let id = guard.next_id;
        guard.next_id += 1;
        guard.connections.insert(
            id,
            TrackedConnection {
                peer,
                cancel: token.clone(),
            },
        );

        Some(Self {
            id,
            token,
            state: state.clone(),
        })
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.lock().connections.remove(&self.id);
    }
}

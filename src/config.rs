//! 프로토콜 설정

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{DEFAULT_PORT, RECEIVE_DIR};

/// UDP 송신 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpMode {
    /// 패킷마다 ACK 대기 + 제한된 재시도
    Reliable,

    /// ACK 없이 연속 전송 (신뢰성 낮은 대체 모드)
    BestEffort,
}

/// LFT 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 수신 소켓 바인드 IP
    pub bind_ip: IpAddr,

    /// TCP/UDP 공용 포트
    /// 0이면 임시 TCP 포트를 받고 UDP도 같은 번호에 바인드
    pub port: u16,

    /// 수신 파일 저장 디렉터리 (필요 시 생성)
    pub receive_dir: PathBuf,

    /// UDP ACK 대기 타임아웃 (밀리초, 시도당)
    pub ack_timeout_ms: u64,

    /// UDP 패킷당 최대 전송 시도 횟수
    pub max_attempts: u32,

    /// UDP 송신 모드
    pub udp_mode: UdpMode,

    /// BestEffort 모드 데이터 패킷 간격 (마이크로초)
    pub best_effort_pacing_us: u64,

    /// UDP 수신 세션 비활성 만료 시간 (밀리초)
    pub session_idle_timeout_ms: u64,

    /// UDP 데이터그램 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// TCP 클라이언트 ACK 읽기 버퍼 크기
    pub ack_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            receive_dir: PathBuf::from(RECEIVE_DIR),
            ack_timeout_ms: 2000,          // 2초
            max_attempts: 5,
            udp_mode: UdpMode::Reliable,
            best_effort_pacing_us: 1000,   // 1ms
            session_idle_timeout_ms: 60_000,
            recv_buffer_size: 2048,
            ack_buffer_size: 1024,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 루프백 테스트용 설정 (임시 포트, 짧은 타임아웃)
    pub fn loopback(receive_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            receive_dir: receive_dir.into(),
            ack_timeout_ms: 200,
            session_idle_timeout_ms: 5_000,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            ack_timeout_ms: 4000,
            max_attempts: 10,
            session_idle_timeout_ms: 180_000,
            ..Self::default()
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.session_idle_timeout_ms)
    }

    pub fn best_effort_pacing(&self) -> Duration {
        Duration::from_micros(self.best_effort_pacing_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_protocol() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.receive_dir, PathBuf::from("./receive"));
        assert_eq!(config.ack_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.udp_mode, UdpMode::Reliable);
    }

    #[test]
    fn test_loopback_preset() {
        let config = Config::loopback("/tmp/lft");
        assert_eq!(config.port, 0);
        assert!(config.bind_ip.is_loopback());
        assert_eq!(config.max_attempts, 5);
    }
}

//! 클라이언트 (송신 진입점)
//!
//! 외부 셸에서 호출하는 `send_files`와 다운타임 토글을 제공한다.
//! 다운타임 중 TCP는 전송을 보류하고, UDP는 패킷을 폐기한다 (손실 시뮬레이션).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::notify::Notifier;
use crate::stats::TransferStats;
use crate::tcp_sender::TcpSender;
use crate::udp_sender::UdpSender;
use crate::{Config, Error, Result};

/// 파일 송신 클라이언트
pub struct Client {
    config: Config,
    notifier: Arc<dyn Notifier>,
    downtime: watch::Sender<bool>,
}

impl Client {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let (downtime, _) = watch::channel(false);
        Self {
            config,
            notifier,
            downtime,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 파일 목록을 서버로 전송
    ///
    /// 빈 목록은 연결 없이 성공으로 처리한다.
    pub async fn send_files(
        &self,
        address: &str,
        port: u16,
        use_tcp: bool,
        paths: &[PathBuf],
    ) -> Result<String> {
        self.transfer(address, port, use_tcp, paths).await?;
        Ok("Files sent successfully".to_owned())
    }

    /// 파일 목록 전송 후 파일별 통계 반환
    pub async fn transfer(
        &self,
        address: &str,
        port: u16,
        use_tcp: bool,
        paths: &[PathBuf],
    ) -> Result<Vec<TransferStats>> {
        if paths.is_empty() {
            info!("전송할 파일 없음");
            return Ok(Vec::new());
        }

        if use_tcp {
            TcpSender::new(
                self.config.clone(),
                self.notifier.clone(),
                self.downtime.subscribe(),
            )
            .send_batch(address, port, paths)
            .await
        } else {
            UdpSender::new(
                self.config.clone(),
                self.notifier.clone(),
                self.downtime.subscribe(),
            )
            .send_batch(address, port, paths)
            .await
        }
    }

    /// 다운타임 설정 (진행 중인 전송에도 즉시 반영)
    pub fn set_downtime(&self, down: bool) {
        self.downtime.send_replace(down);
        info!("다운타임: {}", if down { "on" } else { "off" });
    }

    /// 다운타임 토글, 새 상태 반환
    pub fn toggle_downtime(&self) -> bool {
        let mut now = false;
        self.downtime.send_modify(|down| {
            *down = !*down;
            now = *down;
        });
        info!("다운타임: {}", if now { "on" } else { "off" });
        now
    }

    pub fn is_downtime(&self) -> bool {
        *self.downtime.borrow()
    }
}

/// 호스트 이름 또는 IP 리터럴을 소켓 주소로 해석
pub(crate) async fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((address, port))
        .await
        .map_err(|e| Error::transport(format!("resolve {}:{}", address, port), e))?;

    addrs.next().ok_or_else(|| {
        Error::transport(
            format!("resolve {}:{}", address, port),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no address"),
        )
    })
}

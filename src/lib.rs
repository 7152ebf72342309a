//! # LFT (LAN File Transfer)
//!
//! LAN 안에서 두 피어 간 파일을 주고받는 전송 엔진
//!
//! ## 핵심 특징
//! - **TCP 모드**: 연결 하나에 여러 파일, 세그먼트마다 텍스트 ACK
//! - **UDP 모드**: 패킷마다 ACK 번호 확인 + 타임아웃 재전송
//! - **무결성 검증**: 송신측 MD5 다이제스트를 수신 후 재계산해 비교
//! - **수명주기 관리**: 같은 포트로 TCP/UDP 동시 수신, 중지 시 모든 연결 종료
//! - **알림 추상화**: 진행/에러 이벤트를 `Notifier`로 외부 셸에 전달
//!
//! ## 사용 예
//! ```no_run
//! use std::sync::Arc;
//! use lft::{Client, Config, FileServer, TracingNotifier};
//!
//! # async fn run() -> lft::Result<()> {
//! let server = FileServer::new(Config::default(), Arc::new(TracingNotifier));
//! server.start_receiving()?;
//!
//! let client = Client::new(Config::default(), Arc::new(TracingNotifier));
//! client
//!     .send_files("192.168.0.10", lft::DEFAULT_PORT, true, &["report.pdf".into()])
//!     .await?;
//!
//! server.stop_receiving().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod integrity;
pub mod message;
pub mod notify;
pub mod segment;
pub mod server;
pub mod session;
pub mod stats;
pub mod tcp_receiver;
pub mod tcp_sender;
pub mod udp_receiver;
pub mod udp_sender;

pub use client::Client;
pub use config::{Config, UdpMode};
pub use error::{Error, Result};
pub use message::{AckFrame, FrameType, TcpHeaderFrame, TcpSegmentFrame, UdpFrame};
pub use notify::{ChannelNotifier, Event, Notifier, NullNotifier, TracingNotifier};
pub use segment::{FileMetadata, Segment, SegmentReader};
pub use server::FileServer;
pub use session::{ReassembledFile, SegmentOutcome, TransferSession};
pub use stats::TransferStats;

/// 기본 포트 (TCP/UDP 공용)
pub const DEFAULT_PORT: u16 = 8080;

/// TCP 세그먼트 페이로드 크기 (바이트)
pub const TCP_SEGMENT_SIZE: usize = 1014;

/// UDP 세그먼트 페이로드 크기 (바이트)
pub const UDP_SEGMENT_SIZE: usize = 1024;

/// 기본 수신 디렉터리
pub const RECEIVE_DIR: &str = "./receive";

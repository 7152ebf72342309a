//! LFT 서버 (수신자) - LAN File Transfer
//!
//! 같은 포트로 TCP/UDP 수신을 시작하고 Ctrl+C까지 파일을 받는다.
//!
//! 사용법:
//!   cargo run --release --bin lft-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트(8080), ./receive 에 저장
//!   cargo run --release --bin lft-server
//!
//!   # 다른 포트와 저장 위치
//!   cargo run --release --bin lft-server -- --port 9000 --dir /tmp/inbox

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lft::{Config, FileServer, TracingNotifier};

fn parse_args() -> Result<Config, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_ip = args[i + 1].parse::<IpAddr>()?;
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.port = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--dir" | "-d" => {
                if i + 1 < args.len() {
                    config.receive_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--idle-timeout-ms" => {
                if i + 1 < args.len() {
                    config.session_idle_timeout_ms = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"LFT Server - LAN File Transfer 수신 서버

TCP와 UDP를 같은 포트에서 동시에 수신
- TCP: 연결당 여러 파일, 세그먼트별 ACK
- UDP: 송신자 주소별 세션, 패킷별 ACK 번호

사용법:
  cargo run --release --bin lft-server -- [OPTIONS]

옵션:
  -b, --bind <IP>            바인드 IP (기본: 0.0.0.0)
  -p, --port <PORT>          포트 (기본: 8080)
  -d, --dir <PATH>           저장 디렉터리 (기본: ./receive)
  --idle-timeout-ms <MS>     UDP 세션 만료 시간 (기본: 60000)
  -h, --help                 이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args()?;

    info!("LFT Server starting...");
    info!("Bind address: {}:{}", config.bind_ip, config.port);
    info!("Receive directory: {:?}", config.receive_dir);

    let server = FileServer::new(config, Arc::new(TracingNotifier));
    let message = server.start_receiving()?;
    info!("{}", message);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    server.stop_receiving().await;
    Ok(())
}

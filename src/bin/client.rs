//! LFT 클라이언트 (송신자) - LAN File Transfer
//!
//! 파일 목록을 TCP(기본) 또는 UDP로 서버에 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin lft-client -- --server <HOST> [OPTIONS] FILE...
//!
//! 예시:
//!   # TCP 전송
//!   cargo run --release --bin lft-client -- -s 192.168.0.10 report.pdf photo.jpg
//!
//!   # UDP 전송, 불안정한 네트워크
//!   cargo run --release --bin lft-client -- -s 192.168.0.10 --udp --ack-timeout-ms 4000 --attempts 10 big.iso

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lft::{Client, Config, TracingNotifier, UdpMode, DEFAULT_PORT};

/// 클라이언트 실행 설정
struct ClientArgs {
    server: Option<String>,
    port: u16,
    use_tcp: bool,
    files: Vec<PathBuf>,
    config: Config,
}

impl Default for ClientArgs {
    fn default() -> Self {
        Self {
            server: None,
            port: DEFAULT_PORT,
            use_tcp: true,
            files: Vec::new(),
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<ClientArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ClientArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    parsed.server = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    parsed.port = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--udp" | "-u" => {
                parsed.use_tcp = false;
            }
            "--best-effort" => {
                parsed.use_tcp = false;
                parsed.config.udp_mode = UdpMode::BestEffort;
            }
            "--ack-timeout-ms" => {
                if i + 1 < args.len() {
                    parsed.config.ack_timeout_ms = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--attempts" => {
                if i + 1 < args.len() {
                    parsed.config.max_attempts = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"LFT Client - LAN File Transfer 송신 클라이언트

사용법:
  cargo run --release --bin lft-client -- --server <HOST> [OPTIONS] FILE...

옵션:
  -s, --server <HOST>        서버 주소 (IP 또는 호스트 이름, 필수)
  -p, --port <PORT>          서버 포트 (기본: 8080)
  -u, --udp                  UDP로 전송 (기본: TCP)
  --best-effort              UDP ACK 없이 연속 전송
  --ack-timeout-ms <MS>      UDP ACK 대기 시간 (기본: 2000)
  --attempts <N>             UDP 패킷당 최대 시도 횟수 (기본: 5)
  -h, --help                 이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
"#
                );
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                warn!("알 수 없는 옵션 무시: {}", other);
            }
            file => parsed.files.push(PathBuf::from(file)),
        }
        i += 1;
    }

    Ok(parsed)
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

    let args = parse_args()?;
    let Some(server) = args.server else {
        return Err("--server <HOST> 필요".into());
    };

    info!("LFT Client starting...");
    info!("Server address: {}:{}", server, args.port);
    info!(
        "Transport: {}",
        if args.use_tcp { "TCP" } else { "UDP" }
    );
    info!("Files: {}", args.files.len());

    let client = Client::new(args.config, Arc::new(TracingNotifier));
    let reports = client
        .transfer(&server, args.port, args.use_tcp, &args.files)
        .await?;

    for stats in &reports {
        info!("{}", stats.summary());
    }
    info!("Files sent successfully");
    Ok(())
}

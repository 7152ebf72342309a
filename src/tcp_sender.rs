//! TCP 송신자 (클라이언트측)
//!
//! - 배치 전체에 연결 하나 사용
//! - 세그먼트마다 ACK를 기다리는 stop-and-wait
//! - ACK 내용은 검증하지 않음 (수신 여부만 확인)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::resolve;
use crate::message::{TcpHeaderFrame, TcpSegmentFrame};
use crate::notify::{Event, Notifier};
use crate::segment::{FileMetadata, SegmentReader};
use crate::stats::TransferStats;
use crate::{Config, Error, Result, TCP_SEGMENT_SIZE};

/// TCP 송신자
pub struct TcpSender {
    config: Config,
    notifier: Arc<dyn Notifier>,
    downtime: watch::Receiver<bool>,
}

impl TcpSender {
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
    /// 한 파일이라도 실패하면 나머지를 중단하고 에러를 돌려준다.
    pub async fn send_batch(
        &self,
        address: &str,
        port: u16,
        paths: &[PathBuf],
    ) -> Result<Vec<TransferStats>> {
        let target = resolve(address, port).await.map_err(|e| {
            self.notifier.notify(Event::ClientError {
                message: format!("Invalid address {}:{}", address, port),
            });
            e
        })?;

        let mut stream = TcpStream::connect(target).await.map_err(|e| {
            self.notifier.notify(Event::ClientError {
                message: format!("Could not connect: {}", e),
            });
            Error::transport(format!("connect {}", target), e)
        })?;
        info!("TCP 연결: {} ({} files)", target, paths.len());

        let total_files = paths.len();
        let mut reports = Vec::with_capacity(total_files);

        for (i, path) in paths.iter().enumerate() {
            self.notifier.notify(Event::SendingFileStart {
                file_name: display_name(path),
                current_file: i + 1,
                total_files,
            });

            match self.send_file(&mut stream, path).await {
                Ok(stats) => {
                    info!("TCP 전송 완료: {}", stats.summary());
                    reports.push(stats);
                }
                Err(e) => {
                    warn!("TCP 전송 실패 {:?}: {}", path, e);
                    self.notifier.notify(Event::ClientError {
                        message: format!("Error while sending {}: {}", display_name(path), e),
                    });
                    return Err(e);
                }
            }
        }

        if let Err(e) = stream.shutdown().await {
            debug!("TCP 종료 에러: {}", e);
        }

        self.notifier.notify(Event::ReceptionFinished {
            message: "All files sent successfully".to_owned(),
        });
        Ok(reports)
    }

    /// 열린 스트림으로 파일 하나 전송
    pub async fn send_file<S>(&self, stream: &mut S, path: &Path) -> Result<TransferStats>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut file = File::open(path).await?;
        let meta = FileMetadata::from_file(&mut file, path, TCP_SEGMENT_SIZE).await?;
        let mut stats = TransferStats::new(meta.name.clone(), meta.segment_count);

        debug!(
            "헤더 전송: {} ({} bytes, {} segments, md5 {})",
            meta.name, meta.size, meta.segment_count, meta.digest
        );
        stream.write_all(&TcpHeaderFrame::new(&meta).to_bytes()).await?;

        let mut ack_buf = vec![0u8; self.config.ack_buffer_size.max(1)];
        wait_for_ack(stream, &mut ack_buf).await?;

        let mut reader = SegmentReader::new(file, TCP_SEGMENT_SIZE, 0);
        for _ in 0..meta.segment_count {
            self.wait_while_down().await;

            let segment = reader.next_segment().await?;
            let frame = TcpSegmentFrame::new(segment.index, segment.payload.clone());
            stream.write_all(&frame.to_bytes()).await?;
            stats.record_segment(segment.len());

            self.notifier.notify(Event::SendingFileProgress {
                sent: segment.index + 1,
                total: meta.segment_count,
            });

            wait_for_ack(stream, &mut ack_buf).await?;
        }

        stats.finish();
        Ok(stats)
    }

    /// 다운타임 동안 다음 세그먼트 전송을 보류
    async fn wait_while_down(&self) {
        let mut downtime = self.downtime.clone();
        let down = *downtime.borrow();
        if down {
            info!("다운타임: 전송 보류");
            let _ = downtime.wait_for(|down| !*down).await;
            info!("다운타임 종료: 전송 재개");
        }
    }
}

/// 비어 있지 않은 응답이 올 때까지 대기
async fn wait_for_ack<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    let n = stream.read(buf).await?;
    if n == 0 {
        return Err(Error::ConnectionClosed);
    }
    debug!("ACK: {}", String::from_utf8_lossy(&buf[..n]));
    Ok(())
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

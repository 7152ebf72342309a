//! 수신 세션 (파일 하나의 재조립 상태)
//!
//! TCP 연결 워커 또는 UDP 수신 루프가 단독으로 소유한다.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::notify::{Event, Notifier};
use crate::stats::TransferStats;
use crate::{integrity, Error, Result};

/// 세그먼트 수신 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// 기대 인덱스와 일치, 기록 후 전진
    Written,

    /// 이미 받은 인덱스 (재전송), 기록하지 않음
    Duplicate,

    /// 기대 인덱스보다 앞선 인덱스, 기록하지 않음
    OutOfOrder,
}

/// 수신 세션
pub struct TransferSession {
    name: String,
    path: PathBuf,
    file: BufWriter<File>,
    expected: u32,
    total_segments: u32,
    checksum: String,
    segment_size: usize,
    stats: TransferStats,
}

impl TransferSession {
    /// 저장 디렉터리에 파일을 생성(덮어쓰기)하고 세션 시작
    ///
    /// 이름은 마지막 경로 요소만 사용한다. 같은 이름의 기존 파일은 덮어쓴다.
    pub async fn open(
        dir: &Path,
        name: &str,
        total_segments: u32,
        checksum: String,
        first_index: u32,
        segment_size: usize,
    ) -> Result<Self> {
        let name = sanitize_name(name)?;
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(&name);
        let file = File::create(&path).await?;
        debug!("수신 파일 생성: {:?}", path);

        Ok(Self {
            stats: TransferStats::new(name.clone(), total_segments),
            name,
            path,
            file: BufWriter::new(file),
            expected: first_index,
            total_segments,
            checksum,
            segment_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn expected_index(&self) -> u32 {
        self.expected
    }

    pub fn total_segments(&self) -> u32 {
        self.total_segments
    }

    pub fn duplicates(&self) -> u32 {
        self.stats.duplicate_segments
    }

    /// 세그먼트 반영
    pub async fn accept(&mut self, index: u32, payload: &[u8]) -> Result<SegmentOutcome> {
        if payload.len() > self.segment_size {
            return Err(Error::LengthOverrun {
                field: "payload",
                declared: payload.len(),
                available: self.segment_size,
            });
        }

        if index < self.expected {
            self.stats.record_duplicate();
            debug!(
                "중복 세그먼트 {} (expected {}), 누적 {}",
                index,
                self.expected,
                self.stats.duplicate_segments
            );
            return Ok(SegmentOutcome::Duplicate);
        }

        if index > self.expected {
            return Ok(SegmentOutcome::OutOfOrder);
        }

        self.file.write_all(payload).await?;
        self.expected += 1;
        self.stats.record_segment(payload.len());
        Ok(SegmentOutcome::Written)
    }

    /// 진행률 이벤트
    pub fn progress_event(&self) -> Event {
        Event::ReceivingFileProgress {
            received: self.stats.completed_segments,
            total: self.total_segments,
            duplicate_count: self.stats.duplicate_segments,
        }
    }

    /// 파일을 닫고 검증 대기 상태로 전환
    pub async fn close(mut self) -> Result<ReassembledFile> {
        self.file.flush().await?;
        drop(self.file);
        self.stats.finish();

        Ok(ReassembledFile {
            name: self.name,
            path: self.path,
            checksum: self.checksum,
            stats: self.stats,
        })
    }
}

/// 기록이 끝나고 닫힌 파일
#[derive(Debug)]
pub struct ReassembledFile {
    pub name: String,
    pub path: PathBuf,
    pub checksum: String,
    pub stats: TransferStats,
}

impl ReassembledFile {
    /// 파일을 다시 열어 다이제스트 비교
    ///
    /// 불일치해도 파일은 삭제하지 않는다.
    pub async fn verify(&self) -> Result<()> {
        let actual = integrity::digest_file(&self.path).await?;
        if !actual.eq_ignore_ascii_case(&self.checksum) {
            return Err(Error::ChecksumMismatch {
                file: self.name.clone(),
                expected: self.checksum.clone(),
                got: actual,
            });
        }
        Ok(())
    }

    /// 검증 결과를 알림으로 보고
    pub async fn verify_and_report(&self, notifier: &dyn Notifier, transport: &str) -> Result<()> {
        match self.verify().await {
            Ok(()) => {
                info!("{} 수신 완료 ({}): {}", transport, self.name, self.stats.summary());
                notifier.notify(Event::ReceptionFinished {
                    message: format!("{} ({}) received and verified", self.name, transport),
                });
                Ok(())
            }
            Err(e) => {
                warn!("{} 검증 실패: {}", transport, e);
                notifier.notify(Event::ServerError {
                    message: format!("Checksum error on {} ({})", self.name, transport),
                });
                Err(e)
            }
        }
    }
}

/// 송신자가 보낸 이름에서 마지막 경로 요소만 남김
fn sanitize_name(name: &str) -> Result<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidFileName(name.to_owned()))
}

//! 파일 메타데이터와 세그먼트 정의
//!
//! - FileMetadata: 파일당 한 번 계산, 전송 동안 불변
//! - Segment: 전송 단위 (TCP 1014 bytes, UDP 1024 bytes 이하)

use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::integrity;
use crate::{Error, Result};

/// 세그먼트 수 계산
///
/// `floor(size / segment_size) + 1`. 항상 1 이상이고, 크기가 정확히 배수이면
/// 마지막 세그먼트는 길이 0이 된다.
pub fn segment_count(size: u64, segment_size: usize) -> u32 {
    (size / segment_size as u64) as u32 + 1
}

/// 경로에서 디렉터리 부분을 제거한 파일 이름
pub fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidFileName(path.display().to_string()))
}

/// 파일 메타데이터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// 파일 이름 (경로 제외)
    pub name: String,

    /// 파일 크기 (바이트)
    pub size: u64,

    /// 세그먼트 수
    pub segment_count: u32,

    /// 내용 다이제스트 (hex)
    pub digest: String,
}

impl FileMetadata {
    /// 열린 파일에서 메타데이터 계산
    ///
    /// 다이제스트를 위해 파일을 한 번 끝까지 읽은 뒤 처음으로 되감는다.
    pub async fn from_file(file: &mut File, path: &Path, segment_size: usize) -> Result<Self> {
        let name = base_name(path)?;
        let digest = integrity::digest_reader(&mut *file).await?;
        file.rewind().await?;
        let size = file.metadata().await?.len();

        Ok(Self {
            name,
            size,
            segment_count: segment_count(size, segment_size),
            digest,
        })
    }
}

/// 세그먼트 (송신 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 세그먼트 인덱스 (TCP는 0부터, UDP는 1부터)
    pub index: u32,

    /// 페이로드
    pub payload: Bytes,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// 세그먼트 생성기 (송신측)
///
/// 매 호출마다 최대 `segment_size` 바이트를 채워 읽는다. EOF 이후에는
/// 빈 세그먼트를 돌려준다.
pub struct SegmentReader<R> {
    reader: R,
    segment_size: usize,
    next_index: u32,
}

impl<R: AsyncRead + Unpin> SegmentReader<R> {
    pub fn new(reader: R, segment_size: usize, first_index: u32) -> Self {
        Self {
            reader,
            segment_size,
            next_index: first_index,
        }
    }

    pub async fn next_segment(&mut self) -> Result<Segment> {
        let mut buf = BytesMut::zeroed(self.segment_size);
        let mut filled = 0;

        while filled < self.segment_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        let segment = Segment {
            index: self.next_index,
            payload: buf.freeze(),
        };
        self.next_index += 1;
        Ok(segment)
    }
}

//! 파일 무결성 검증
//!
//! 128비트 MD5 다이제스트를 hex 문자열로 사용. 손상 탐지용이며 보안 경계가 아니다.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Result;

/// 빈 입력의 다이제스트
pub const EMPTY_DIGEST: &str = "d41d8cd98f00b204e9800998ecf8427e";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// 리더를 끝까지 한 번 읽어 다이제스트 계산
pub async fn digest_reader<R: AsyncRead + Unpin>(mut reader: R) -> Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// 파일 다이제스트
pub async fn digest_file(path: &Path) -> Result<String> {
    let file = File::open(path).await?;
    digest_reader(file).await
}

pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// 파일 다이제스트가 기대값과 같은지 확인
pub async fn verify(path: &Path, expected_hex: &str) -> Result<bool> {
    let actual = digest_file(path).await?;
    Ok(actual.eq_ignore_ascii_case(expected_hex))
}

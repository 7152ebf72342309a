//! 에러 타입 정의

use thiserror::Error;

/// LFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 주소 해석, 연결, 바인드 실패
    #[error("전송 계층 에러 ({context}): {source}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("유효하지 않은 구분 바이트: {frame} 프레임, expected {expected:#04X}, got {got:#04X}")]
    InvalidSentinel {
        frame: &'static str,
        expected: u8,
        got: u8,
    },

    #[error("길이 필드 초과: {field} 선언값 {declared}, 사용 가능 {available}")]
    LengthOverrun {
        field: &'static str,
        declared: usize,
        available: usize,
    },

    #[error("알 수 없는 프레임 타입: {0}")]
    UnknownFrameType(u8),

    #[error("유효하지 않은 ACK 프레임 ({len} bytes)")]
    InvalidAck { len: usize },

    #[error("세그먼트 순서 불일치: expected {expected}, got {got}")]
    SequenceGap { expected: u32, got: u32 },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFileName(String),

    #[error("체크섬 불일치 ({file}): expected {expected}, got {got}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        got: String,
    },

    #[error("ACK {ack_number} 대기 재시도 초과 ({attempts}회)")]
    RetryExhausted { ack_number: u32, attempts: u32 },

    #[error("서버가 이미 수신 대기 중")]
    AlreadyListening,

    #[error("연결 종료")]
    ConnectionClosed,
}

impl Error {
    pub(crate) fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Transport {
            context: context.into(),
            source,
        }
    }

    /// 프레임 경계/형식 위반 계열 여부 (재동기화 없이 연결을 끊어야 하는 에러)
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Error::InvalidSentinel { .. }
                | Error::LengthOverrun { .. }
                | Error::UnknownFrameType(_)
                | Error::InvalidAck { .. }
                | Error::SequenceGap { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

//! 프로토콜 프레임 정의
//!
//! TCP와 UDP 두 전송 방식의 바이너리 프레임 인코딩/디코딩.
//! I/O 없음, 상태 없음. 모든 정수는 빅엔디언.
//!
//! ```text
//! TCP 헤더:    [0x01][segmentCount:u32][nameLen:u32][checksumLen:u32][name][checksum][0x00]
//! TCP 세그먼트: [0x00][segmentIndex:u32][dataLen:u32][data][0x01]
//! UDP 시작:    [0x01][totalSegments:u32][nameLen:u32][checksumLen:u32][name][checksum]
//! UDP 데이터:   [0x02][seqNum:u32][data]
//! UDP 종료:    [0x03][finalSeqNum:u32]
//! UDP ACK:    ["ACK"][ackNum:u32]   (7 bytes, 패딩 없음)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::segment::FileMetadata;
use crate::{Error, Result, TCP_SEGMENT_SIZE};

/// TCP 헤더 프레임 시작 구분 바이트
pub const TCP_HEADER_START: u8 = 0x01;

/// TCP 헤더 프레임 끝 구분 바이트
pub const TCP_HEADER_END: u8 = 0x00;

/// TCP 세그먼트 프레임 시작 구분 바이트
pub const TCP_SEGMENT_START: u8 = 0x00;

/// TCP 세그먼트 프레임 끝 구분 바이트
pub const TCP_SEGMENT_END: u8 = 0x01;

/// 헤더 타입 바이트 뒤의 고정 필드 블록 (segmentCount, nameLen, checksumLen)
pub const TCP_HEADER_FIELDS_LEN: usize = 12;

/// 세그먼트 고정 헤더 (구분 바이트 + index + dataLen)
pub const TCP_SEGMENT_PREFIX_LEN: usize = 9;

/// 헤더 본문(name + checksum) 최대 허용 길이
pub const MAX_HEADER_BODY: usize = 64 * 1024;

/// ACK 프레임 리터럴 접두사
pub const ACK_PREFIX: &[u8; 3] = b"ACK";

/// ACK 프레임 전체 길이
pub const ACK_FRAME_LEN: usize = 7;

/// TCP 파일 헤더 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeaderFrame {
    pub segment_count: u32,
    pub name: String,
    pub checksum: String,
}

impl TcpHeaderFrame {
    pub fn new(meta: &FileMetadata) -> Self {
        Self {
            segment_count: meta.segment_count,
            name: meta.name.clone(),
            checksum: meta.digest.clone(),
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            1 + TCP_HEADER_FIELDS_LEN + self.name.len() + self.checksum.len() + 1,
        );
        buf.put_u8(TCP_HEADER_START);
        buf.put_u32(self.segment_count);
        buf.put_u32(self.name.len() as u32);
        buf.put_u32(self.checksum.len() as u32);
        buf.put_slice(self.name.as_bytes());
        buf.put_slice(self.checksum.as_bytes());
        buf.put_u8(TCP_HEADER_END);
        buf.freeze()
    }

    /// 완전한 버퍼에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cur = bytes;
        let kind = take(&mut cur, 1, "header type")?[0];
        expect_sentinel("header", TCP_HEADER_START, kind)?;
        let fields = TcpHeaderFields::parse(take(&mut cur, TCP_HEADER_FIELDS_LEN, "header fields")?)?;
        let body = take(&mut cur, fields.body_len(), "header body")?;
        fields.finish(body)
    }
}

/// 스트림에서 읽은 TCP 헤더 고정 필드
///
/// 수신측은 타입 바이트, 12바이트 블록, 본문 순으로 정확한 길이만큼 읽는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeaderFields {
    pub segment_count: u32,
    pub name_len: u32,
    pub checksum_len: u32,
}

impl TcpHeaderFields {
    pub fn parse(block: &[u8]) -> Result<Self> {
        let mut cur = block;
        let fields = Self {
            segment_count: take_u32(&mut cur, "segmentCount")?,
            name_len: take_u32(&mut cur, "nameLen")?,
            checksum_len: take_u32(&mut cur, "checksumLen")?,
        };

        let declared = fields.name_len as usize + fields.checksum_len as usize;
        if declared > MAX_HEADER_BODY {
            return Err(Error::LengthOverrun {
                field: "nameLen+checksumLen",
                declared,
                available: MAX_HEADER_BODY,
            });
        }
        Ok(fields)
    }

    /// 남은 본문 길이 (name + checksum + 끝 구분 바이트)
    pub fn body_len(&self) -> usize {
        self.name_len as usize + self.checksum_len as usize + 1
    }

    pub fn finish(&self, body: &[u8]) -> Result<TcpHeaderFrame> {
        let mut cur = body;
        let name = decode_name(take(&mut cur, self.name_len as usize, "name")?)?;
        let checksum = take(&mut cur, self.checksum_len as usize, "checksum")?;
        let end = take(&mut cur, 1, "header end")?[0];
        expect_sentinel("header", TCP_HEADER_END, end)?;

        Ok(TcpHeaderFrame {
            segment_count: self.segment_count,
            name,
            checksum: String::from_utf8_lossy(checksum).into_owned(),
        })
    }
}

/// TCP 세그먼트 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegmentFrame {
    pub index: u32,
    pub data: Bytes,
}

impl TcpSegmentFrame {
    pub fn new(index: u32, data: Bytes) -> Self {
        Self { index, data }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(TCP_SEGMENT_PREFIX_LEN + self.data.len() + 1);
        buf.put_u8(TCP_SEGMENT_START);
        buf.put_u32(self.index);
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.put_u8(TCP_SEGMENT_END);
        buf.freeze()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cur = bytes;
        let prefix = TcpSegmentPrefix::parse(take(&mut cur, TCP_SEGMENT_PREFIX_LEN, "segment prefix")?)?;
        let body = take(&mut cur, prefix.body_len(), "segment body")?;
        prefix.finish(body)
    }
}

/// 스트림에서 읽은 TCP 세그먼트 고정 헤더 (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegmentPrefix {
    pub index: u32,
    pub data_len: u32,
}

impl TcpSegmentPrefix {
    pub fn parse(block: &[u8]) -> Result<Self> {
        let mut cur = block;
        let start = take(&mut cur, 1, "segment start")?[0];
        expect_sentinel("segment", TCP_SEGMENT_START, start)?;

        let index = take_u32(&mut cur, "segmentIndex")?;
        let data_len = take_u32(&mut cur, "dataLen")?;
        if data_len as usize > TCP_SEGMENT_SIZE {
            return Err(Error::LengthOverrun {
                field: "dataLen",
                declared: data_len as usize,
                available: TCP_SEGMENT_SIZE,
            });
        }

        Ok(Self { index, data_len })
    }

    /// 남은 본문 길이 (data + 끝 구분 바이트)
    pub fn body_len(&self) -> usize {
        self.data_len as usize + 1
    }

    pub fn finish(&self, body: &[u8]) -> Result<TcpSegmentFrame> {
        let mut cur = body;
        let data = take(&mut cur, self.data_len as usize, "segment data")?;
        let end = take(&mut cur, 1, "segment end")?[0];
        expect_sentinel("segment", TCP_SEGMENT_END, end)?;

        Ok(TcpSegmentFrame {
            index: self.index,
            data: Bytes::copy_from_slice(data),
        })
    }
}

/// UDP 프레임 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// 전송 시작 (메타데이터)
    Start = 1,

    /// 데이터 세그먼트
    Data = 2,

    /// 전송 종료
    End = 3,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameType::Start),
            2 => Ok(FrameType::Data),
            3 => Ok(FrameType::End),
            other => Err(Error::UnknownFrameType(other)),
        }
    }
}

/// UDP 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdpFrame {
    Start {
        total_segments: u32,
        name: String,
        checksum: String,
    },
    Data {
        seq: u32,
        payload: Bytes,
    },
    End {
        final_seq: u32,
    },
}

impl UdpFrame {
    pub fn start(meta: &FileMetadata) -> Self {
        UdpFrame::Start {
            total_segments: meta.segment_count,
            name: meta.name.clone(),
            checksum: meta.digest.clone(),
        }
    }

    /// 종료 프레임 (finalSeqNum = totalSegments + 1)
    pub fn end(total_segments: u32) -> Self {
        UdpFrame::End {
            final_seq: total_segments.wrapping_add(1),
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            UdpFrame::Start { .. } => FrameType::Start,
            UdpFrame::Data { .. } => FrameType::Data,
            UdpFrame::End { .. } => FrameType::End,
        }
    }

    /// 이 프레임에 대해 기대하는 ACK 번호
    pub fn expected_ack(&self) -> u32 {
        match self {
            UdpFrame::Start { .. } => 0,
            UdpFrame::Data { seq, .. } => *seq,
            UdpFrame::End { final_seq } => *final_seq,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            UdpFrame::Start {
                total_segments,
                name,
                checksum,
            } => {
                let mut buf = BytesMut::with_capacity(13 + name.len() + checksum.len());
                buf.put_u8(FrameType::Start as u8);
                buf.put_u32(*total_segments);
                buf.put_u32(name.len() as u32);
                buf.put_u32(checksum.len() as u32);
                buf.put_slice(name.as_bytes());
                buf.put_slice(checksum.as_bytes());
                buf.freeze()
            }
            UdpFrame::Data { seq, payload } => {
                let mut buf = BytesMut::with_capacity(5 + payload.len());
                buf.put_u8(FrameType::Data as u8);
                buf.put_u32(*seq);
                buf.put_slice(payload);
                buf.freeze()
            }
            UdpFrame::End { final_seq } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u8(FrameType::End as u8);
                buf.put_u32(*final_seq);
                buf.freeze()
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cur = bytes;
        let kind = FrameType::try_from(take(&mut cur, 1, "frame type")?[0])?;

        match kind {
            FrameType::Start => {
                let total_segments = take_u32(&mut cur, "totalSegments")?;
                let name_len = take_u32(&mut cur, "nameLen")? as usize;
                let checksum_len = take_u32(&mut cur, "checksumLen")? as usize;
                let name = decode_name(take(&mut cur, name_len, "name")?)?;
                let checksum = take(&mut cur, checksum_len, "checksum")?;

                Ok(UdpFrame::Start {
                    total_segments,
                    name,
                    checksum: String::from_utf8_lossy(checksum).into_owned(),
                })
            }
            FrameType::Data => {
                let seq = take_u32(&mut cur, "seqNum")?;
                Ok(UdpFrame::Data {
                    seq,
                    payload: Bytes::copy_from_slice(cur),
                })
            }
            FrameType::End => Ok(UdpFrame::End {
                final_seq: take_u32(&mut cur, "finalSeqNum")?,
            }),
        }
    }
}

/// UDP ACK 프레임
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    pub number: u32,
}

impl AckFrame {
    pub fn new(number: u32) -> Self {
        Self { number }
    }

    pub fn to_bytes(&self) -> [u8; ACK_FRAME_LEN] {
        let mut buf = [0u8; ACK_FRAME_LEN];
        buf[..3].copy_from_slice(ACK_PREFIX);
        buf[3..].copy_from_slice(&self.number.to_be_bytes());
        buf
    }

    /// 정확히 7바이트이고 "ACK"로 시작해야 함
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ACK_FRAME_LEN || &bytes[..3] != ACK_PREFIX {
            return Err(Error::InvalidAck { len: bytes.len() });
        }
        let mut cur = &bytes[3..];
        Ok(Self {
            number: cur.get_u32(),
        })
    }
}

/// TCP ACK 본문 (내용은 클라이언트가 검증하지 않음)
pub fn tcp_header_ack(name: &str) -> String {
    format!("Header received for {}", name)
}

pub fn tcp_segment_ack(number: u32) -> String {
    format!("Segment {} received", number)
}

fn take<'a>(cur: &mut &'a [u8], len: usize, field: &'static str) -> Result<&'a [u8]> {
    if cur.len() < len {
        return Err(Error::LengthOverrun {
            field,
            declared: len,
            available: cur.len(),
        });
    }
    let (head, tail) = cur.split_at(len);
    *cur = tail;
    Ok(head)
}

fn take_u32(cur: &mut &[u8], field: &'static str) -> Result<u32> {
    let mut bytes = take(cur, 4, field)?;
    Ok(bytes.get_u32())
}

fn expect_sentinel(frame: &'static str, expected: u8, got: u8) -> Result<()> {
    if expected != got {
        return Err(Error::InvalidSentinel {
            frame,
            expected,
            got,
        });
    }
    Ok(())
}

fn decode_name(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::InvalidFileName(String::from_utf8_lossy(bytes).into_owned()))
}

//! 전송 통계

use std::time::{Duration, Instant};

/// 파일 하나의 전송 통계 (송신/수신 공용)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 파일 이름
    pub file_name: String,

    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간
    pub finish_time: Option<Instant>,

    /// 선언된 총 세그먼트 수
    pub total_segments: u32,

    /// 처리 완료된 세그먼트 수 (송신 또는 기록)
    pub completed_segments: u32,

    /// 페이로드 바이트 수
    pub total_bytes: u64,

    /// 중복 수신 세그먼트 수
    pub duplicate_segments: u32,

    /// ACK 타임아웃으로 재전송한 패킷 수
    pub retransmitted_packets: u32,
}

impl TransferStats {
    pub fn new(file_name: impl Into<String>, total_segments: u32) -> Self {
        Self {
            file_name: file_name.into(),
            start_time: Instant::now(),
            finish_time: None,
            total_segments,
            completed_segments: 0,
            total_bytes: 0,
            duplicate_segments: 0,
            retransmitted_packets: 0,
        }
    }

    /// 세그먼트 처리 기록
    pub fn record_segment(&mut self, len: usize) {
        self.completed_segments += 1;
        self.total_bytes += len as u64;
    }

    /// 중복 기록
    pub fn record_duplicate(&mut self) {
        self.duplicate_segments += 1;
    }

    pub fn record_retransmits(&mut self, count: u32) {
        self.retransmitted_packets += count;
    }

    pub fn finish(&mut self) {
        self.finish_time.get_or_insert_with(Instant::now);
    }

    /// 경과 시간 (종료 전이면 현재까지)
    pub fn elapsed(&self) -> Duration {
        match self.finish_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "{} | Elapsed: {:.2}s | Segments: {}/{} | Bytes: {} | Throughput: {:.2} MB/s | Duplicates: {} | Retransmits: {}",
            self.file_name,
            self.elapsed().as_secs_f64(),
            self.completed_segments,
            self.total_segments,
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.duplicate_segments,
            self.retransmitted_packets,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_summary() {
        let mut stats = TransferStats::new("a.bin", 3);
        stats.record_segment(1014);
        stats.record_segment(10);
        stats.record_duplicate();
        stats.record_retransmits(2);
        stats.finish();

        assert_eq!(stats.completed_segments, 2);
        assert_eq!(stats.total_bytes, 1024);
        let summary = stats.summary();
        assert!(summary.starts_with("a.bin"));
        assert!(summary.contains("Segments: 2/3"));
        assert!(summary.contains("Duplicates: 1"));
        assert!(summary.contains("Retransmits: 2"));
    }

    #[test]
    fn test_finish_freezes_elapsed() {
        let mut stats = TransferStats::new("b", 1);
        stats.finish();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.elapsed(), first);
    }
}

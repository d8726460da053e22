//! 프로토콜 설정

use crate::{
    DEFAULT_FRAGMENT_SIZE, DEFAULT_JITTER_WINDOW, DEFAULT_MAX_PAYLOAD_LEN,
    DEFAULT_NACK_GROUP_SIZE,
};

/// SQP 전송 계층 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 단편 페이로드 최대 크기 (바이트, 0이면 분할 없음)
    pub max_fragment_size: usize,

    /// 지터 윈도우 용량 (슬롯 수)
    pub jitter_window: usize,

    /// NACK 그룹 크기 (그룹당 비트맵 바이트 상한)
    pub max_nack_group_size: usize,

    /// 헤더 length 필드 상한 (바이트)
    pub max_payload_len: usize,

    /// NACK 요청 주기 힌트 (밀리초)
    /// 실제 전송 주기는 외부 스케줄러 몫
    pub nack_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_fragment_size: DEFAULT_FRAGMENT_SIZE,
            jitter_window: DEFAULT_JITTER_WINDOW,
            max_nack_group_size: DEFAULT_NACK_GROUP_SIZE,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            nack_interval_ms: 100,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 저지연 스트림용 설정
    pub fn low_latency() -> Self {
        Self {
            max_fragment_size: 1200,
            jitter_window: 50,
            max_nack_group_size: 16,
            max_payload_len: 1024 * 1024,     // 1MB
            nack_interval_ms: 30,
        }
    }

    /// 대용량 전송용 설정
    pub fn bulk_transfer() -> Self {
        Self {
            max_fragment_size: 1400,
            jitter_window: 1000,
            max_nack_group_size: 64,
            max_payload_len: 16 * 1024 * 1024, // 16MB
            nack_interval_ms: 100,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            max_fragment_size: 1000,          // 작은 단편
            jitter_window: 200,
            max_nack_group_size: 32,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            nack_interval_ms: 200,
        }
    }

    /// 프레임 하나가 몇 개 단편으로 쪼개지는지 계산
    pub fn fragments_per_frame(&self, frame_len: usize) -> usize {
        if self.max_fragment_size == 0 || frame_len == 0 {
            return 1;
        }
        (frame_len + self.max_fragment_size - 1) / self.max_fragment_size
    }
}

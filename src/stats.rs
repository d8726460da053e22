//! 전송 통계

/// 프레이머 통계
#[derive(Debug, Clone, Default)]
pub struct FramerStats {
    /// 내보낸 단편 수
    pub packets: u64,

    /// 소비한 바이트 수
    pub bytes: u64,

    /// 재동기화로 건너뛴 바이트 수
    pub skipped_bytes: u64,

    /// 유효성 검사에 실패한 헤더 후보 수
    pub invalid_headers: u64,
}

/// 스티처 통계
#[derive(Debug, Clone, Default)]
pub struct StitcherStats {
    /// 수락한 단편 수
    pub packets: u64,

    /// 내보낸 프레임 수
    pub frames: u64,

    /// 윈도우 내 중복 단편 수
    pub duplicates: u64,

    /// 헤드를 과거로 되돌린 횟수 (지터 한도 내 늦은 도착)
    pub rewinds: u64,

    /// 윈도우 과부하로 헤드를 점프시킨 횟수
    pub window_snaps: u64,
}

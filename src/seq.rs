//! 시퀀스 ID와 랩어라운드 연산
//!
//! 16비트 시퀀스 공간의 거리/비교는 재조립 로직과 분리해
//! 독립적으로 검증한다. 부호/경계 실수가 가장 잦은 지점이다.

/// 단편 시퀀스 ID (세션 단위 단조 증가, mod 65536)
pub type SequenceId = u16;

/// 시퀀스 공간의 절반 (비교 기준점)
const HALF_RANGE: u16 = 32768;

/// from에서 to까지의 전방 거리 (mod 65536)
pub fn forward_distance(from: SequenceId, to: SequenceId) -> u16 {
    to.wrapping_sub(from)
}

/// from에서 to까지의 후방 거리 (mod 65536)
pub fn backward_distance(from: SequenceId, to: SequenceId) -> u16 {
    from.wrapping_sub(to)
}

/// 랩어라운드를 고려한 비교: a가 b보다 최신인가
pub fn seq_greater_than(a: SequenceId, b: SequenceId) -> bool {
    ((a > b) && (a - b <= HALF_RANGE)) || ((a < b) && (b - a > HALF_RANGE))
}

/// 랩어라운드를 고려한 비교: a가 b보다 과거인가
pub fn seq_less_than(a: SequenceId, b: SequenceId) -> bool {
    seq_greater_than(b, a)
}

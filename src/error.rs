//! 에러 타입 정의

use thiserror::Error;

/// SQP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("헤더가 너무 짧음: {len} bytes (최소 {min})")]
    HeaderTooShort { len: usize, min: usize },

    #[error("유효하지 않은 시그니처: expected {expected:02X}, got {got:02X}")]
    InvalidSignature { expected: u8, got: u8 },

    #[error("유효하지 않은 패딩 비트: expected {expected:03b}, got {got:03b}")]
    InvalidPadding { expected: u8, got: u8 },

    #[error("페이로드 길이 초과: {len} bytes (최대 {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("잘린 패킷: expected {expected} bytes, got {got}")]
    TruncatedPacket { expected: usize, got: usize },

    #[error("유효하지 않은 NACK 페이로드: {len} bytes")]
    InvalidNackPayload { len: usize },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

//! 단편 헤더 (9바이트 비트팩 와이어 포맷)
//!
//! ```text
//! 오프셋 0: u8  시그니처 = 0x7A
//! 오프셋 1: u8  세션 ID
//! 오프셋 2: u8  packet_type[0:3] | head[3] | tail[4] | padding[5:8] = 0b111
//! 오프셋 3: u16 시퀀스 ID (LE)
//! 오프셋 5: u32 페이로드 길이 (LE)
//! ```
//!
//! 9바이트 후보 윈도우는 시그니처와 패딩이 모두 일치할 때만 유효한
//! 헤더다. 체크섬 대신 이 불변식으로 스트림 정렬 깨짐을 검출한다.

use crate::error::{Error, Result};
use crate::seq::SequenceId;
use crate::{HEADER_PADDING, HEADER_SIZE, SIGNATURE};

/// 패킷 타입 (3비트)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// 데이터 단편
    Fragment,

    /// 누락 시퀀스 재전송 요청
    RequestNack,

    /// 예약된 값 (0, 3~7)
    Reserved(u8),
}

impl PacketType {
    /// 와이어 값에서 변환
    pub fn from_wire(value: u8) -> Self {
        match value & 0x07 {
            1 => PacketType::Fragment,
            2 => PacketType::RequestNack,
            other => PacketType::Reserved(other),
        }
    }

    /// 와이어 값으로 변환
    pub fn to_wire(self) -> u8 {
        match self {
            PacketType::Fragment => 1,
            PacketType::RequestNack => 2,
            PacketType::Reserved(other) => other & 0x07,
        }
    }
}

/// 단편 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// 세션 ID (스트림 구분자, 이 계층에서는 불투명)
    pub session_id: u8,

    /// 패킷 타입
    pub packet_type: PacketType,

    /// 프레임의 첫 단편 여부
    pub head: bool,

    /// 프레임의 마지막 단편 여부
    pub tail: bool,

    /// 시퀀스 ID
    pub sequence_id: SequenceId,

    /// 페이로드 길이 (바이트)
    pub length: u32,
}

impl FragmentHeader {
    /// 헤더를 9바이트 배열로 인코딩
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = SIGNATURE;
        buf[1] = self.session_id;
        buf[2] = self.packet_type.to_wire()
            | (self.head as u8) << 3
            | (self.tail as u8) << 4
            | HEADER_PADDING << 5;
        buf[3..5].copy_from_slice(&self.sequence_id.to_le_bytes());
        buf[5..9].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// 9바이트 윈도우에서 헤더 디코딩
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::HeaderTooShort {
                len: buf.len(),
                min: HEADER_SIZE,
            });
        }
        if buf[0] != SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: SIGNATURE,
                got: buf[0],
            });
        }
        let padding = buf[2] >> 5;
        if padding != HEADER_PADDING {
            return Err(Error::InvalidPadding {
                expected: HEADER_PADDING,
                got: padding,
            });
        }

        Ok(Self {
            session_id: buf[1],
            packet_type: PacketType::from_wire(buf[2] & 0x07),
            head: buf[2] & 0x08 != 0,
            tail: buf[2] & 0x10 != 0,
            sequence_id: u16::from_le_bytes([buf[3], buf[4]]),
            length: u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
        })
    }

    /// 헤더 포함 전체 패킷 크기 (바이트)
    pub fn packet_size(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}

//! 단편 (와이어 패킷 뷰)
//!
//! 헤더 + 페이로드 전체를 덮는 버퍼 위의 뷰.
//! 프레이머가 만든 단편은 수신 청크를 빌릴 수 있으므로,
//! 콜백 밖으로 들고 나가려면 detach로 사본을 떠야 한다.

use bytes::Bytes;

use crate::buffer::PacketBuffer;
use crate::error::{Error, Result};
use crate::header::{FragmentHeader, PacketType};
use crate::seq::SequenceId;
use crate::HEADER_SIZE;

/// 단편: 와이어 패킷 하나 (헤더 + 페이로드)
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    header: FragmentHeader,
    data: PacketBuffer<'a>,
}

impl<'a> Fragment<'a> {
    /// 버퍼에서 단편 파싱 (헤더 유효성 + 패킷 길이 검증)
    pub fn parse(data: PacketBuffer<'a>) -> Result<Self> {
        let header = FragmentHeader::decode(data.as_slice())?;
        let expected = header.packet_size();
        if data.len() < expected {
            return Err(Error::TruncatedPacket {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { header, data })
    }

    /// 슬라이스에서 제로카피 단편 파싱
    pub fn from_slice(slice: &'a [u8]) -> Result<Self> {
        Self::parse(PacketBuffer::Borrowed(slice))
    }

    /// 헤더 반환
    pub fn header(&self) -> &FragmentHeader {
        &self.header
    }

    /// 세션 ID
    pub fn session_id(&self) -> u8 {
        self.header.session_id
    }

    /// 패킷 타입
    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }

    /// 시퀀스 ID
    pub fn sequence_id(&self) -> SequenceId {
        self.header.sequence_id
    }

    /// 프레임의 첫 단편인지
    pub fn is_first(&self) -> bool {
        self.header.head
    }

    /// 프레임의 마지막 단편인지
    pub fn is_last(&self) -> bool {
        self.header.tail
    }

    /// 프레임 전체가 단편 하나에 담겼는지
    pub fn is_full(&self) -> bool {
        self.header.head && self.header.tail
    }

    /// 페이로드 길이 (바이트)
    pub fn length(&self) -> usize {
        self.header.length as usize
    }

    /// 헤더 포함 전체 패킷 크기
    pub fn packet_size(&self) -> usize {
        self.header.packet_size()
    }

    /// 페이로드 슬라이스
    pub fn payload(&self) -> &[u8] {
        &self.data.as_slice()[HEADER_SIZE..self.packet_size()]
    }

    /// 와이어 바이트 전체 (헤더 포함)
    pub fn as_bytes(&self) -> &[u8] {
        &self.data.as_slice()[..self.packet_size()]
    }

    /// 버퍼가 빌린 뷰인지
    pub fn is_borrowed(&self) -> bool {
        self.data.is_borrowed()
    }

    /// 유효성 재검사 (헤더 불변식 + 패킷 길이)
    pub fn is_valid(&self) -> bool {
        match FragmentHeader::decode(self.data.as_slice()) {
            Ok(header) => self.data.len() >= header.packet_size(),
            Err(_) => false,
        }
    }

    /// 호출 범위를 넘어 보관 가능한 단편으로 변환
    pub fn detach(&self) -> Fragment<'static> {
        Fragment {
            header: self.header,
            data: self.data.detach(),
        }
    }

    /// 와이어 바이트를 소유 버퍼로 추출
    pub fn into_bytes(self) -> Bytes {
        let size = self.packet_size();
        self.data.into_shared().slice(..size)
    }
}

impl Fragment<'static> {
    /// 소유 버퍼에서 단편 파싱
    pub fn from_shared(bytes: Bytes) -> Result<Self> {
        Self::parse(PacketBuffer::Shared(bytes))
    }

    /// 빌더가 인코딩을 마친 패킷으로 단편 생성
    pub(crate) fn from_parts(header: FragmentHeader, bytes: Bytes) -> Self {
        Fragment {
            header,
            data: PacketBuffer::Shared(bytes),
        }
    }
}

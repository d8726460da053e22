//! 단편 빌더
//!
//! - 송신 메시지를 최대 크기 이하 단편들로 분할
//! - 누락 시퀀스 집합을 NACK 요청 패킷으로 인코딩

use std::collections::BTreeSet;

use bytes::{BufMut, BytesMut};

use crate::fragment::Fragment;
use crate::header::{FragmentHeader, PacketType};
use crate::nack;
use crate::seq::SequenceId;
use crate::HEADER_SIZE;

fn make_fragment(header: FragmentHeader, payload: &[u8]) -> Fragment<'static> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    Fragment::from_parts(header, buf.freeze())
}

/// 메시지를 단편들로 분할
///
/// max_fragment_size가 0이면 전체 페이로드를 단편 하나에 담는다.
/// 시퀀스 ID는 starting_id부터 단편마다 1씩 증가하며 (mod 65536),
/// 프레임이 아니라 세션 단위로 이어진다 — 손실 검출이 프레임 경계를
/// 넘어 동작한다. head는 첫 단편에만, tail은 마지막 단편에만 선다.
/// 빈 메시지는 단편을 만들지 않으므로 호출자는 길이 0 프레임의
/// 수신을 기대하면 안 된다.
pub fn build_fragments(
    session_id: u8,
    starting_id: SequenceId,
    max_fragment_size: usize,
    data: &[u8],
) -> Vec<Fragment<'static>> {
    if data.is_empty() {
        return Vec::new();
    }

    let chunk_size = if max_fragment_size == 0 {
        data.len()
    } else {
        max_fragment_size
    };
    let total = (data.len() + chunk_size - 1) / chunk_size;

    data.chunks(chunk_size)
        .enumerate()
        .map(|(idx, payload)| {
            let header = FragmentHeader {
                session_id,
                packet_type: PacketType::Fragment,
                head: idx == 0,
                tail: idx == total - 1,
                sequence_id: starting_id.wrapping_add(idx as u16),
                length: payload.len() as u32,
            };
            make_fragment(header, payload)
        })
        .collect()
}

/// 누락 시퀀스 집합을 NACK 요청 패킷들로 인코딩
///
/// 그룹마다 request_nack 단편 하나를 만들며 head=tail=true로 세운다.
/// NACK 패킷도 역방향 스트림의 단편이므로 next_id부터 시퀀스 ID를
/// 소모한다. 빈 집합은 패킷을 만들지 않는다.
pub fn build_nack_request(
    session_id: u8,
    next_id: SequenceId,
    max_nack_group_size: usize,
    missing: &BTreeSet<SequenceId>,
) -> Vec<Fragment<'static>> {
    nack::encode_groups(missing, max_nack_group_size)
        .into_iter()
        .enumerate()
        .map(|(idx, payload)| {
            let header = FragmentHeader {
                session_id,
                packet_type: PacketType::RequestNack,
                head: true,
                tail: true,
                sequence_id: next_id.wrapping_add(idx as u16),
                length: payload.len() as u32,
            };
            make_fragment(header, &payload)
        })
        .collect()
}

/// 세션 단위 단편 생성기
///
/// 단조 증가 시퀀스 카운터를 보관한다. 동시 호출자 간 공유에는
/// 외부 동기화가 필요하다.
pub struct FragmentBuilder {
    session_id: u8,
    next_id: SequenceId,
}

impl FragmentBuilder {
    /// 새 생성기 (시퀀스 0부터)
    pub fn new(session_id: u8) -> Self {
        Self::with_starting_id(session_id, 0)
    }

    /// 시작 시퀀스 ID를 지정해 생성
    pub fn with_starting_id(session_id: u8, starting_id: SequenceId) -> Self {
        Self {
            session_id,
            next_id: starting_id,
        }
    }

    /// 세션 ID
    pub fn session_id(&self) -> u8 {
        self.session_id
    }

    /// 다음에 배정될 시퀀스 ID
    pub fn next_id(&self) -> SequenceId {
        self.next_id
    }

    /// 메시지 분할 (카운터 전진)
    pub fn split(&mut self, max_fragment_size: usize, data: &[u8]) -> Vec<Fragment<'static>> {
        let fragments = build_fragments(self.session_id, self.next_id, max_fragment_size, data);
        self.next_id = self.next_id.wrapping_add(fragments.len() as u16);
        fragments
    }

    /// NACK 요청 인코딩 (카운터 전진)
    pub fn nack_request(
        &mut self,
        max_nack_group_size: usize,
        missing: &BTreeSet<SequenceId>,
    ) -> Vec<Fragment<'static>> {
        let fragments =
            build_nack_request(self.session_id, self.next_id, max_nack_group_size, missing);
        self.next_id = self.next_id.wrapping_add(fragments.len() as u16);
        fragments
    }
}

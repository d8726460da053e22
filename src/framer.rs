//! 스트림 프레이머
//!
//! 전송 계층이 넘겨주는 임의 크기 바이트 청크를 소비해 완성된 단편을
//! 동기 콜백으로 내보낸다. 헤더 불변식(시그니처+패딩)이 깨진 자리에서는
//! 1바이트씩 전진하며 다음 패킷 경계를 재탐색한다.
//!
//! 패킷 전체가 현재 청크 안에 있으면 제로카피 뷰로 바로 내보내고,
//! 청크 경계에 걸친 패킷만 누적 버퍼로 복사한다.

use bytes::BytesMut;
use tracing::debug;

use crate::fragment::Fragment;
use crate::header::FragmentHeader;
use crate::stats::FramerStats;
use crate::{DEFAULT_MAX_PAYLOAD_LEN, HEADER_SIZE, SIGNATURE};

/// 스트림 프레이머
pub struct StreamFramer {
    /// 청크 경계에 걸친 패킷의 누적 버퍼
    acc: BytesMut,

    /// 헤더 length 필드 상한 — 초과하면 손상 헤더로 취급한다
    max_payload_len: usize,

    stats: FramerStats,
}

impl StreamFramer {
    /// 기본 페이로드 상한으로 생성
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PAYLOAD_LEN)
    }

    /// 페이로드 길이 상한을 지정해 생성
    pub fn with_limit(max_payload_len: usize) -> Self {
        Self {
            acc: BytesMut::new(),
            max_payload_len,
            stats: FramerStats::default(),
        }
    }

    /// 누적 버퍼 초기화 (외부에서 스트림 불연속을 검출했을 때)
    pub fn reset(&mut self) {
        self.acc.clear();
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> FramerStats {
        self.stats.clone()
    }

    /// 수신 청크 소비
    ///
    /// 완성된 단편마다 on_fragment를 동기 호출한다. 콜백이 단편을
    /// 호출 범위 밖에 보관하려면 detach해야 한다. 콜백에서 같은
    /// 프레이머에 재진입하면 안 된다.
    pub fn push_stream<F>(&mut self, chunk: &[u8], mut on_fragment: F)
    where
        F: FnMut(Fragment<'_>),
    {
        self.stats.bytes += chunk.len() as u64;

        let mut i = 0;
        while i < chunk.len() {
            if self.acc.is_empty() {
                i = self.scan(chunk, i, &mut on_fragment);
            } else {
                i = self.accumulate(chunk, i, &mut on_fragment);
            }
        }
    }

    /// length 상한까지 적용한 헤더 디코딩
    fn decode_bounded(&self, buf: &[u8]) -> Option<FragmentHeader> {
        let header = FragmentHeader::decode(buf).ok()?;
        if header.length as usize > self.max_payload_len {
            debug!(
                "헤더 length 상한 초과: {} > {}",
                header.length, self.max_payload_len
            );
            return None;
        }
        Some(header)
    }

    /// 누적 버퍼가 빈 상태에서 청크를 직접 스캔
    fn scan<F>(&mut self, chunk: &[u8], i: usize, on_fragment: &mut F) -> usize
    where
        F: FnMut(Fragment<'_>),
    {
        if chunk[i] != SIGNATURE {
            self.stats.skipped_bytes += 1;
            return i + 1;
        }

        let rest = &chunk[i..];
        if rest.len() < HEADER_SIZE {
            // 헤더가 청크 경계에 걸림: 남은 바이트를 누적
            self.acc.extend_from_slice(rest);
            return chunk.len();
        }

        let Some(header) = self.decode_bounded(&rest[..HEADER_SIZE]) else {
            // 시그니처는 맞지만 헤더가 깨짐: 1바이트 재동기화
            self.stats.invalid_headers += 1;
            self.stats.skipped_bytes += 1;
            return i + 1;
        };

        let packet_size = header.packet_size();
        if rest.len() < packet_size {
            // 패킷이 다음 청크로 이어짐
            self.acc.extend_from_slice(rest);
            return chunk.len();
        }

        match Fragment::from_slice(&rest[..packet_size]) {
            Ok(fragment) => {
                self.stats.packets += 1;
                on_fragment(fragment);
                i + packet_size
            }
            Err(_) => {
                self.stats.invalid_headers += 1;
                self.stats.skipped_bytes += 1;
                i + 1
            }
        }
    }

    /// 누적 버퍼에 걸쳐 있는 패킷을 마저 채운다
    fn accumulate<F>(&mut self, chunk: &[u8], mut i: usize, on_fragment: &mut F) -> usize
    where
        F: FnMut(Fragment<'_>),
    {
        // 누적은 항상 시그니처 바이트에서 시작하므로 헤더부터 완성한다
        if self.acc.len() < HEADER_SIZE {
            let need = HEADER_SIZE - self.acc.len();
            let take = need.min(chunk.len() - i);
            self.acc.extend_from_slice(&chunk[i..i + take]);
            i += take;

            if self.acc.len() < HEADER_SIZE {
                return i;
            }
            if self.decode_bounded(&self.acc[..HEADER_SIZE]).is_none() {
                // 거짓 시그니처였음: 후보 바이트를 버리고 재탐색
                debug!("누적 헤더 유효성 실패, {} bytes 폐기", self.acc.len());
                self.stats.invalid_headers += 1;
                self.stats.skipped_bytes += self.acc.len() as u64;
                self.acc.clear();
                return i;
            }
        }

        let Some(header) = self.decode_bounded(&self.acc[..HEADER_SIZE]) else {
            self.acc.clear();
            return i;
        };

        let packet_size = header.packet_size();
        let need = packet_size - self.acc.len();
        let take = need.min(chunk.len() - i);
        self.acc.extend_from_slice(&chunk[i..i + take]);
        i += take;

        if self.acc.len() == packet_size {
            let packet = self.acc.split().freeze();
            match Fragment::from_shared(packet) {
                Ok(fragment) => {
                    self.stats.packets += 1;
                    on_fragment(fragment);
                }
                Err(_) => {
                    self.stats.invalid_headers += 1;
                }
            }
        }
        i
    }
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

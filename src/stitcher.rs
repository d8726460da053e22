//! 재조립 엔진 (스티처)
//!
//! 순서가 뒤바뀐 단편을 시퀀스 ID 기반 링버퍼에 보관했다가
//! 헤드부터 연속 구간이 확정되는 대로 프레임을 내보낸다.
//! 누락 구간은 get_lost_packets로 보고하며, 재전송 요청의 시점과
//! 횟수는 외부 정책이다.

use std::collections::BTreeSet;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::fragment::Fragment;
use crate::header::PacketType;
use crate::seq::{backward_distance, forward_distance, SequenceId};
use crate::stats::StitcherStats;
use crate::DEFAULT_JITTER_WINDOW;

/// 재조립 엔진
pub struct Stitcher {
    /// 재정렬 윈도우 (슬롯 인덱스 = sequence_id % capacity)
    window: Vec<Option<Fragment<'static>>>,

    /// 다음에 소비할 시퀀스 ID
    head_id: SequenceId,

    /// 첫 단편 수신 여부
    started: bool,

    stats: StitcherStats,
}

impl Stitcher {
    /// 기본 지터 윈도우 용량으로 생성
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_JITTER_WINDOW)
    }

    /// 지정한 윈도우 용량으로 생성
    ///
    /// 용량이 지터 허용 한도다. 프레임 하나가 용량 이상의 단편으로
    /// 쪼개지면 연속 구간이 만들어질 수 없으므로, 용량은 프레임당
    /// 최대 단편 수보다 커야 한다. 용량은 1..=32768로 잘린다.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, 32768);
        Self {
            window: vec![None; capacity],
            head_id: 0,
            started: false,
            stats: StitcherStats::default(),
        }
    }

    /// 윈도우 용량
    pub fn capacity(&self) -> usize {
        self.window.len()
    }

    /// 다음에 소비할 시퀀스 ID
    pub fn head_id(&self) -> SequenceId {
        self.head_id
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> StitcherStats {
        self.stats.clone()
    }

    /// 단편 투입
    ///
    /// 완성되는 프레임마다 on_frame을 동기 호출한다. 콜백이 받은
    /// 슬라이스는 호출 동안만 유효하다. 유효하지 않거나 데이터 단편이
    /// 아닌 입력은 상태 변경 없이 false를 돌려준다.
    pub fn push_packet<F>(&mut self, fragment: &Fragment<'_>, mut on_frame: F) -> bool
    where
        F: FnMut(&[u8]),
    {
        if !fragment.is_valid() || fragment.packet_type() != PacketType::Fragment {
            return false;
        }

        let id = fragment.sequence_id();
        let capacity = self.window.len() as u16;

        // 빠른 경로: 단일 단편 프레임이 순서대로 도착하면 윈도우를 거치지 않는다
        if (!self.started || id == self.head_id) && fragment.is_full() {
            self.started = true;
            self.head_id = id.wrapping_add(1);
            self.stats.packets += 1;
            self.stats.frames += 1;
            on_frame(fragment.payload());
            self.process_buffer(&mut on_frame);
            return true;
        }

        if !self.started {
            self.started = true;
            self.head_id = id;
        }

        let fwd = forward_distance(self.head_id, id);
        if fwd >= capacity {
            let back = backward_distance(self.head_id, id);
            if back <= capacity {
                // 지터 한도 내의 늦은 도착: 헤드를 되돌려 받아들인다
                debug!("헤드 되감기: {} -> {}", self.head_id, id);
                self.head_id = id;
                self.stats.rewinds += 1;
            } else {
                // 윈도우 과부하: 헤드를 새 단편의 꼬리에 맞춰 점프시킨다.
                // 보류 중이던 구간은 손실 보고로 넘어간다.
                let new_head = id.wrapping_sub(capacity - 1);
                warn!(
                    "윈도우 과부하: head {} -> {} (id {})",
                    self.head_id, new_head, id
                );
                self.head_id = new_head;
                self.stats.window_snaps += 1;
            }
        }

        let idx = (id as usize) % self.window.len();
        if let Some(existing) = &self.window[idx] {
            if existing.sequence_id() == id {
                self.stats.duplicates += 1;
            }
        }
        // 윈도우에 넣으려면 수신 버퍼에서 떼어내야 한다
        self.window[idx] = Some(fragment.detach());
        self.stats.packets += 1;

        self.process_buffer(&mut on_frame);
        true
    }

    /// 현재 시점의 누락 시퀀스 ID 집합
    ///
    /// 윈도우 꼬리(head + C - 1)에서 헤드 쪽으로 내려가며, 더 새로운
    /// 단편이 이미 도착한 뒤에 비어 있는 ID만 손실로 본다. 아직
    /// 도착할 차례가 안 된 ID는 손실로 치지 않는다.
    pub fn get_lost_packets(&self) -> BTreeSet<SequenceId> {
        let mut lost = BTreeSet::new();
        if !self.started {
            return lost;
        }

        let mut has_tail = false;
        for i in (0..self.window.len()).rev() {
            let id = self.head_id.wrapping_add(i as u16);
            if self.slot(id).is_some() {
                has_tail = true;
            } else if has_tail {
                lost.insert(id);
            }
        }
        lost
    }

    /// 모든 슬롯 비우기 (head_id는 유지)
    pub fn clear_buffer(&mut self) {
        for slot in &mut self.window {
            *slot = None;
        }
    }

    /// 초기 상태로 리셋 (프레이머 디싱크 후 전체 재시작)
    pub fn reset(&mut self) {
        self.clear_buffer();
        self.head_id = 0;
        self.started = false;
    }

    /// 헤드부터 연속 구간을 스캔해 완성된 프레임을 내보낸다
    ///
    /// 빈 슬롯이나 ID 불일치(간극)에서 멈추고, 다음 투입 때 같은
    /// 자리에서 재개한다. 프레임은 꼬리 단편까지 모두 모였을 때만
    /// 소비하므로 간극이 조립 중간 상태를 깨뜨리지 않는다.
    fn process_buffer<F>(&mut self, on_frame: &mut F)
    where
        F: FnMut(&[u8]),
    {
        loop {
            let (is_full, is_first) = match self.slot(self.head_id) {
                Some(fragment) => (fragment.is_full(), fragment.is_first()),
                None => break,
            };

            if is_full {
                let idx = (self.head_id as usize) % self.window.len();
                let fragment = self.window[idx].take();
                self.head_id = self.head_id.wrapping_add(1);
                self.stats.frames += 1;
                if let Some(fragment) = fragment {
                    on_frame(fragment.payload());
                }
                continue;
            }

            if !is_first {
                // 헤드가 프레임 중간에 서 있다: 시작 단편이 늦게 오면
                // 되감기로 받아들이고, 영영 오지 않으면 이후 트래픽의
                // 윈도우 점프가 헤드를 지나가게 한다
                break;
            }

            // 여러 단편짜리 프레임: 꼬리까지 연속으로 모였는지 먼저 확인
            let Some(end_id) = self.find_frame_end(self.head_id) else {
                break;
            };

            let mut acc = BytesMut::new();
            let mut id = self.head_id;
            loop {
                let idx = (id as usize) % self.window.len();
                if let Some(fragment) = self.window[idx].take() {
                    acc.extend_from_slice(fragment.payload());
                }
                if id == end_id {
                    break;
                }
                id = id.wrapping_add(1);
            }
            self.head_id = end_id.wrapping_add(1);
            self.stats.frames += 1;
            on_frame(&acc);
        }
    }

    /// start의 시작 단편부터 꼬리 단편까지 연속으로 모였으면 꼬리 ID 반환
    fn find_frame_end(&self, start: SequenceId) -> Option<SequenceId> {
        let mut id = start;
        loop {
            let fragment = self.slot(id)?;
            if fragment.is_last() {
                return Some(id);
            }
            id = id.wrapping_add(1);
            if forward_distance(start, id) as usize >= self.window.len() {
                // 윈도우보다 넓은 프레임은 완성될 수 없다
                return None;
            }
        }
    }

    /// 기대 ID와 저장 ID가 일치하는 슬롯 참조
    fn slot(&self, id: SequenceId) -> Option<&Fragment<'static>> {
        let idx = (id as usize) % self.window.len();
        self.window[idx]
            .as_ref()
            .filter(|fragment| fragment.sequence_id() == id)
    }
}

impl Default for Stitcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_fragments, build_nack_request};
    use crate::header::FragmentHeader;
    use bytes::Bytes;

    fn push_all(
        stitcher: &mut Stitcher,
        fragments: &[Fragment<'static>],
        frames: &mut Vec<Vec<u8>>,
    ) {
        for fragment in fragments {
            assert!(stitcher.push_packet(fragment, |frame| frames.push(frame.to_vec())));
        }
    }

    #[test]
    fn test_fast_path_single_fragment_frames() {
        let mut stitcher = Stitcher::new();
        let mut frames = Vec::new();

        for i in 0..3u16 {
            let fragments = build_fragments(0, i, 0, &[i as u8; 10]);
            push_all(&mut stitcher, &fragments, &mut frames);
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], vec![2u8; 10]);
        assert_eq!(stitcher.head_id(), 3);
        // 빠른 경로는 윈도우를 쓰지 않는다
        assert!(stitcher.window.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_multi_fragment_frame_in_order() {
        let data: Vec<u8> = (0..130u32).map(|i| i as u8).collect();
        let fragments = build_fragments(0, 0, 50, &data);

        let mut stitcher = Stitcher::new();
        let mut frames = Vec::new();
        push_all(&mut stitcher, &fragments, &mut frames);

        assert_eq!(frames, vec![data]);
        assert_eq!(stitcher.head_id(), 3);
    }

    #[test]
    fn test_out_of_order_within_window() {
        let data: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        let fragments = build_fragments(0, 0, 50, &data);

        let mut stitcher = Stitcher::new();
        let mut frames = Vec::new();
        for idx in [1usize, 3, 0, 2] {
            assert!(stitcher.push_packet(&fragments[idx], |frame| frames.push(frame.to_vec())));
        }

        assert_eq!(frames, vec![data]);
        assert!(stitcher.get_lost_packets().is_empty());
    }

    #[test]
    fn test_interleaved_frames_emit_in_sequence_order() {
        let a: Vec<u8> = vec![1; 90];
        let b: Vec<u8> = vec![2; 90];
        let frags_a = build_fragments(0, 0, 50, &a);
        let frags_b = build_fragments(0, 2, 50, &b);

        let mut stitcher = Stitcher::new();
        let mut frames = Vec::new();
        for fragment in [&frags_b[0], &frags_a[1], &frags_b[1], &frags_a[0]] {
            assert!(stitcher.push_packet(fragment, |frame| frames.push(frame.to_vec())));
        }

        assert_eq!(frames, vec![a, b]);
        assert_eq!(stitcher.head_id(), 4);
    }

    #[test]
    fn test_invalid_fragment_rejected() {
        // length가 10이라고 주장하지만 바이트가 모자란 단편
        let header = FragmentHeader {
            session_id: 0,
            packet_type: PacketType::Fragment,
            head: true,
            tail: true,
            sequence_id: 0,
            length: 10,
        };
        let bad = Fragment::from_parts(header, Bytes::copy_from_slice(&header.encode()));

        let mut stitcher = Stitcher::new();
        assert!(!stitcher.push_packet(&bad, |_| unreachable!()));
        assert_eq!(stitcher.stats().packets, 0);
    }

    #[test]
    fn test_nack_packet_rejected() {
        let missing: BTreeSet<u16> = [1, 2].into_iter().collect();
        let nack = build_nack_request(0, 0, 32, &missing).remove(0);

        let mut stitcher = Stitcher::new();
        assert!(!stitcher.push_packet(&nack, |_| unreachable!()));
    }

    #[test]
    fn test_lost_packets_framed_by_newer_arrival() {
        let mut stitcher = Stitcher::with_capacity(50);
        let mut frames = Vec::new();

        // h, h+2, h+3 도착, h+1 누락
        let h = 100u16;
        let data = vec![0u8; 200];
        let fragments = build_fragments(0, h, 50, &data);
        for idx in [0usize, 2, 3] {
            assert!(stitcher.push_packet(&fragments[idx], |frame| frames.push(frame.to_vec())));
        }

        let lost = stitcher.get_lost_packets();
        assert_eq!(lost, [h + 1].into_iter().collect());
        assert!(frames.is_empty());
    }

    #[test]
    fn test_no_loss_reported_without_newer_arrival() {
        let mut stitcher = Stitcher::new();

        // 2단편 프레임의 첫 단편만 도착: 아직 아무것도 손실이 아니다
        let fragments = build_fragments(0, 0, 50, &vec![0u8; 100]);
        assert!(stitcher.push_packet(&fragments[0], |_| unreachable!()));

        assert!(stitcher.get_lost_packets().is_empty());
    }

    #[test]
    fn test_window_overload_snaps_head_forward() {
        let capacity = 8u16;
        let mut stitcher = Stitcher::with_capacity(capacity as usize);
        let mut frames = Vec::new();

        // 2단편 프레임의 첫 단편이 보류 중
        let pending = build_fragments(0, 0, 50, &vec![9u8; 100]);
        assert!(stitcher.push_packet(&pending[0], |frame| frames.push(frame.to_vec())));

        // 윈도우 밖 한참 앞의 단편
        let far_id = capacity + 20;
        let far = build_fragments(0, far_id, 0, b"far ahead");
        assert!(stitcher.push_packet(&far[0], |frame| frames.push(frame.to_vec())));

        assert_eq!(stitcher.head_id(), far_id - capacity + 1);
        assert_eq!(stitcher.stats().window_snaps, 1);
        assert!(frames.is_empty());

        // 버려진 구간은 새 단편 뒤의 간극으로 손실 보고된다
        let lost = stitcher.get_lost_packets();
        let expected: BTreeSet<u16> = (far_id - capacity + 1..far_id).collect();
        assert_eq!(lost, expected);
    }

    #[test]
    fn test_snap_then_gap_fill_resumes() {
        let capacity = 8u16;
        let mut stitcher = Stitcher::with_capacity(capacity as usize);
        let mut frames = Vec::new();

        let far_id = 30u16;
        let far = build_fragments(0, far_id, 0, b"tail frame");
        assert!(stitcher.push_packet(&far[0], |frame| frames.push(frame.to_vec())));
        // 첫 단편이 full이므로 빠른 경로로 즉시 나간다
        assert_eq!(frames.len(), 1);

        // 이어지는 순서 단편들도 정상 처리
        let next = build_fragments(0, far_id + 1, 0, b"next");
        assert!(stitcher.push_packet(&next[0], |frame| frames.push(frame.to_vec())));
        assert_eq!(frames.len(), 2);
        assert_eq!(stitcher.head_id(), far_id + 2);
    }

    #[test]
    fn test_rewind_accepts_late_start() {
        let mut stitcher = Stitcher::new();
        let mut frames = Vec::new();

        let data: Vec<u8> = (0..150u32).map(|i| i as u8).collect();
        let fragments = build_fragments(0, 0, 50, &data);

        // 가운데 단편이 먼저 도착해 헤드가 1로 잡힌다
        assert!(stitcher.push_packet(&fragments[1], |frame| frames.push(frame.to_vec())));
        assert_eq!(stitcher.head_id(), 1);

        // 첫 단편이 늦게 도착하면 헤드를 되감아 받아들인다
        assert!(stitcher.push_packet(&fragments[0], |frame| frames.push(frame.to_vec())));
        assert_eq!(stitcher.head_id(), 0);
        assert_eq!(stitcher.stats().rewinds, 1);

        assert!(stitcher.push_packet(&fragments[2], |frame| frames.push(frame.to_vec())));
        assert_eq!(frames, vec![data]);
    }

    #[test]
    fn test_duplicate_fragment_counted_once() {
        let mut stitcher = Stitcher::new();
        let mut frames = Vec::new();

        let fragments = build_fragments(0, 0, 50, &vec![3u8; 100]);
        assert!(stitcher.push_packet(&fragments[0], |frame| frames.push(frame.to_vec())));
        assert!(stitcher.push_packet(&fragments[0], |frame| frames.push(frame.to_vec())));
        assert!(stitcher.push_packet(&fragments[1], |frame| frames.push(frame.to_vec())));

        assert_eq!(frames.len(), 1);
        assert_eq!(stitcher.stats().duplicates, 1);
    }

    #[test]
    fn test_snap_walks_past_stuck_continuation() {
        let capacity = 8u16;
        let mut stitcher = Stitcher::with_capacity(capacity as usize);
        let mut frames = Vec::new();

        // 3단편 프레임(ids 4,5,6)의 시작 단편이 영영 오지 않는 상황
        let broken = build_fragments(0, 4, 50, &vec![1u8; 150]);
        assert!(stitcher.push_packet(&broken[1], |frame| frames.push(frame.to_vec())));
        assert!(stitcher.push_packet(&broken[2], |frame| frames.push(frame.to_vec())));
        assert_eq!(stitcher.head_id(), 5);
        assert!(frames.is_empty());

        // 이후 트래픽이 이어지면 윈도우 점프가 막힌 헤드를 지나간다
        for id in 7..=14u16 {
            let full = build_fragments(0, id, 0, &[id as u8]);
            assert!(stitcher.push_packet(&full[0], |frame| frames.push(frame.to_vec())));
        }

        assert_eq!(stitcher.stats().window_snaps, 2);
        assert_eq!(stitcher.head_id(), 15);
        let emitted: Vec<u8> = frames.iter().map(|f| f[0]).collect();
        assert_eq!(emitted, (7..=14u8).collect::<Vec<u8>>());
    }

    #[test]
    fn test_clear_buffer_keeps_head() {
        let mut stitcher = Stitcher::new();
        let fragments = build_fragments(0, 0, 50, &vec![0u8; 100]);
        assert!(stitcher.push_packet(&fragments[0], |_| unreachable!()));

        let head = stitcher.head_id();
        stitcher.clear_buffer();

        assert_eq!(stitcher.head_id(), head);
        assert!(stitcher.window.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_reset_restarts_stream() {
        let mut stitcher = Stitcher::new();
        let mut frames = Vec::new();

        let first = build_fragments(0, 500, 0, b"before reset");
        assert!(stitcher.push_packet(&first[0], |frame| frames.push(frame.to_vec())));
        assert_eq!(stitcher.head_id(), 501);

        stitcher.reset();
        assert_eq!(stitcher.head_id(), 0);

        // 리셋 후에는 어떤 ID에서든 새로 시작할 수 있다
        let second = build_fragments(0, 7, 0, b"after reset");
        assert!(stitcher.push_packet(&second[0], |frame| frames.push(frame.to_vec())));
        assert_eq!(frames.len(), 2);
        assert_eq!(stitcher.head_id(), 8);
    }
}

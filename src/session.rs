//! 세션 (스트림 단위 조립 파이프라인)
//!
//! 프레이머 → 스티처 → 프레임 콜백으로 이어지는 수신 경로와
//! 빌더 기반 송신/NACK 경로를 논리 스트림 하나 단위로 묶는다.
//! 소켓, 재전송 저장소, 타이밍은 외부 몫이다. 스트림을 여러 개
//! 다중화하려면 세션을 그 수만큼 만든다.

use std::collections::BTreeSet;

use bytes::Bytes;
use tracing::debug;

use crate::builder::FragmentBuilder;
use crate::config::Config;
use crate::framer::StreamFramer;
use crate::header::PacketType;
use crate::nack;
use crate::seq::SequenceId;
use crate::stats::{FramerStats, StitcherStats};
use crate::stitcher::Stitcher;

/// 논리 스트림 하나의 송수신 상태
pub struct Session {
    config: Config,
    builder: FragmentBuilder,
    framer: StreamFramer,
    stitcher: Stitcher,
}

impl Session {
    /// 설정으로 세션 생성
    pub fn new(session_id: u8, config: Config) -> Self {
        Self {
            builder: FragmentBuilder::new(session_id),
            framer: StreamFramer::with_limit(config.max_payload_len),
            stitcher: Stitcher::with_capacity(config.jitter_window),
            config,
        }
    }

    /// 세션 ID
    pub fn session_id(&self) -> u8 {
        self.builder.session_id()
    }

    /// 다음에 배정될 송신 시퀀스 ID
    pub fn next_id(&self) -> SequenceId {
        self.builder.next_id()
    }

    /// 송신 메시지를 와이어 패킷들로 변환
    pub fn send(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.builder
            .split(self.config.max_fragment_size, data)
            .into_iter()
            .map(|fragment| fragment.into_bytes())
            .collect()
    }

    /// 수신 청크 처리
    ///
    /// 완성된 프레임마다 on_frame을 동기 호출하고, 청크에 실려 온
    /// 재전송 요청(request_nack)이 가리키는 시퀀스 ID들을 모아
    /// 돌려준다. 재전송 여부와 시점은 호출자가 정한다.
    pub fn push_stream<F>(&mut self, chunk: &[u8], mut on_frame: F) -> Vec<SequenceId>
    where
        F: FnMut(&[u8]),
    {
        let mut requested = Vec::new();
        let stitcher = &mut self.stitcher;

        self.framer.push_stream(chunk, |fragment| {
            match fragment.packet_type() {
                PacketType::RequestNack => match nack::decode(fragment.payload()) {
                    Ok(ids) => requested.extend(ids),
                    Err(e) => debug!("NACK 페이로드 파싱 실패: {}", e),
                },
                _ => {
                    stitcher.push_packet(&fragment, &mut on_frame);
                }
            }
        });

        requested
    }

    /// 현재 시점의 누락 시퀀스 ID 집합
    pub fn lost_packets(&self) -> BTreeSet<SequenceId> {
        self.stitcher.get_lost_packets()
    }

    /// 누락 집합을 NACK 요청 패킷들로 인코딩
    ///
    /// 누락이 없으면 빈 목록을 돌려준다.
    pub fn build_nack(&mut self) -> Vec<Bytes> {
        let missing = self.stitcher.get_lost_packets();
        self.builder
            .nack_request(self.config.max_nack_group_size, &missing)
            .into_iter()
            .map(|fragment| fragment.into_bytes())
            .collect()
    }

    /// 재조립 상태 전체 리셋 (스트림 불연속 후 재시작)
    pub fn reset(&mut self) {
        self.framer.reset();
        self.stitcher.reset();
    }

    /// 프레이머 통계
    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// 스티처 통계
    pub fn stitcher_stats(&self) -> StitcherStats {
        self.stitcher.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_fragments;

    fn deliver(session: &mut Session, packets: &[Bytes], frames: &mut Vec<Vec<u8>>) {
        for packet in packets {
            session.push_stream(packet, |frame| frames.push(frame.to_vec()));
        }
    }

    #[test]
    fn test_end_to_end_roundtrip() {
        let mut tx = Session::new(1, Config::default());
        let mut rx = Session::new(1, Config::default());

        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let packets = tx.send(&data);
        assert_eq!(packets.len(), 4);

        let mut frames = Vec::new();
        deliver(&mut rx, &packets, &mut frames);

        assert_eq!(frames, vec![data]);
        assert!(rx.lost_packets().is_empty());
        assert_eq!(rx.stitcher_stats().frames, 1);
    }

    #[test]
    fn test_roundtrip_in_single_chunk() {
        let mut tx = Session::new(0, Config::default());
        let mut rx = Session::new(0, Config::default());

        let data = vec![0xA5u8; 3000];
        let mut wire = Vec::new();
        for packet in tx.send(&data) {
            wire.extend_from_slice(&packet);
        }

        let mut frames = Vec::new();
        rx.push_stream(&wire, |frame| frames.push(frame.to_vec()));

        assert_eq!(frames, vec![data]);
    }

    #[test]
    fn test_concrete_reorder_scenario() {
        // 200바이트를 50바이트 단편 4개로 쪼개 1,3,0,2 순서로 전달
        let data: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        let fragments = build_fragments(0, 0, 50, &data);
        assert_eq!(fragments.len(), 4);

        let mut rx = Session::new(0, Config::default());
        let mut frames = Vec::new();
        for idx in [1usize, 3, 0, 2] {
            let packet = fragments[idx].clone().into_bytes();
            rx.push_stream(&packet, |frame| frames.push(frame.to_vec()));
        }

        assert_eq!(frames, vec![data]);
        assert!(rx.lost_packets().is_empty());
    }

    #[test]
    fn test_nack_flow_recovers_loss() {
        let mut tx = Session::new(2, Config::default());
        let mut rx = Session::new(2, Config::default());

        let data: Vec<u8> = (0..4200u32).map(|i| i as u8).collect();
        let packets = tx.send(&data);
        assert_eq!(packets.len(), 3);

        // 가운데 패킷 유실
        let mut frames = Vec::new();
        deliver(&mut rx, &[packets[0].clone(), packets[2].clone()], &mut frames);
        assert!(frames.is_empty());

        let lost = rx.lost_packets();
        assert_eq!(lost, [1u16].into_iter().collect());

        // NACK 왕복: 수신측 요청 → 송신측 프레이머가 ID 복원
        let nack_packets = rx.build_nack();
        assert_eq!(nack_packets.len(), 1);

        let mut requested = Vec::new();
        for packet in &nack_packets {
            requested.extend(tx.push_stream(packet, |_| unreachable!()));
        }
        assert_eq!(requested, vec![1u16]);

        // 재전송으로 프레임 완성
        deliver(&mut rx, &[packets[1].clone()], &mut frames);
        assert_eq!(frames, vec![data]);
        assert!(rx.lost_packets().is_empty());
    }

    #[test]
    fn test_reset_clears_reassembly() {
        let mut tx = Session::new(0, Config::default());
        let mut rx = Session::new(0, Config::default());

        let packets = tx.send(&vec![1u8; 4000]);
        let mut frames = Vec::new();
        deliver(&mut rx, &packets[..1], &mut frames);

        rx.reset();

        // 리셋 후 남은 단편만으로는 프레임이 완성되지 않는다
        deliver(&mut rx, &packets[1..], &mut frames);
        assert!(frames.is_empty());
    }
}

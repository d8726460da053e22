//! 손실 링크 왕복 데모
//!
//! 시드 고정 난수로 패킷을 유실/재정렬시키는 가상 링크 위에서
//! 분할 → 프레이밍 → 재조립 → NACK → 재전송 사이클을 끝까지 돌려
//! 원본 복원을 검증한다. 실전과 같이 NACK 라운드를 스트림 중간중간
//! 끼워 넣는다 — 복구가 윈도우 지평선보다 늦으면 점프로 프레임을
//! 버리게 된다.
//!
//! 사용법:
//!   cargo run --release --example lossy_link -- [--loss 0.3] [--frames 200]

use std::collections::HashMap;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sqp::{Config, FragmentBuilder, SequenceId, Session};

fn parse_args() -> (f64, usize) {
    let args: Vec<String> = std::env::args().collect();
    let mut loss = 0.3f64;
    let mut frames = 200usize;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--loss" => {
                if i + 1 < args.len() {
                    loss = args[i + 1].parse().expect("유효한 손실률 필요");
                    i += 1;
                }
            }
            "--frames" => {
                if i + 1 < args.len() {
                    frames = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    (loss, frames)
}

/// 테스트용 패턴 프레임 생성
fn generate_frames(count: usize, rng: &mut StdRng) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let len = rng.gen_range(1..16 * 1024);
            (0..len).map(|j| ((i + j) % 256) as u8).collect()
        })
        .collect()
}

/// 손실 링크: 확률적으로 유실시키며 수신 세션에 전달
fn deliver(
    session: &mut Session,
    wire: &Bytes,
    loss_rate: f64,
    rng: &mut StdRng,
    recovered: &mut Vec<Vec<u8>>,
) -> bool {
    if rng.gen_bool(loss_rate) {
        return false;
    }
    session.push_stream(wire, |frame| recovered.push(frame.to_vec()));
    true
}

/// 누락이 사라질 때까지 NACK 요청-재전송 반복
///
/// 요청 패킷은 송신측 세션의 프레이머를 거쳐 ID로 복원되고,
/// 재전송도 같은 손실 링크를 탄다.
fn nack_rounds(
    receiver: &mut Session,
    sender_side: &mut Session,
    sent: &HashMap<SequenceId, Bytes>,
    loss_rate: f64,
    rng: &mut StdRng,
    recovered: &mut Vec<Vec<u8>>,
) -> (usize, usize) {
    let mut rounds = 0usize;
    let mut retransmitted = 0usize;

    while !receiver.lost_packets().is_empty() {
        rounds += 1;
        assert!(rounds <= 100, "NACK 라운드가 수렴하지 않음");

        let nack_packets = receiver.build_nack();
        let mut requested: Vec<SequenceId> = Vec::new();
        for packet in &nack_packets {
            requested.extend(sender_side.push_stream(packet, |_| unreachable!()));
        }

        for id in requested {
            let wire = sent.get(&id).expect("송신 기록 없음");
            if deliver(receiver, wire, loss_rate, rng, recovered) {
                retransmitted += 1;
            }
        }
    }

    (rounds, retransmitted)
}

fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("로깅 초기화 실패");

    let (loss_rate, frame_count) = parse_args();
    let mut rng = StdRng::seed_from_u64(7);

    let config = Config::default();
    let originals = generate_frames(frame_count, &mut rng);
    let total_bytes: usize = originals.iter().map(|f| f.len()).sum();
    info!(
        "전송 시작: {} frames, {} bytes, 손실률 {:.0}%",
        frame_count,
        total_bytes,
        loss_rate * 100.0
    );

    // 송신측: 단편 생성 + 재전송용 송신 기록
    let mut builder = FragmentBuilder::new(0);
    let mut sent: HashMap<SequenceId, Bytes> = HashMap::new();
    let mut wire_packets: Vec<(SequenceId, Bytes)> = Vec::new();

    for frame in &originals {
        for fragment in builder.split(config.max_fragment_size, frame) {
            let id = fragment.sequence_id();
            let wire = fragment.into_bytes();
            sent.insert(id, wire.clone());
            wire_packets.push((id, wire));
        }
    }
    let last_id = wire_packets.last().map(|(id, _)| *id).expect("빈 전송");
    info!("단편 수: {}", wire_packets.len());

    // 수신측 세션과 송신측 NACK 수신용 세션
    let mut receiver = Session::new(0, config.clone());
    let mut sender_side = Session::new(0, config.clone());
    let mut recovered: Vec<Vec<u8>> = Vec::new();

    // 윈도우 절반 크기 배치로 순서를 섞어 전송하고, 배치마다
    // NACK 라운드를 돌려 복구가 윈도우를 따라가게 한다.
    // 마지막 단편은 손실 보고의 기준점이 없어지므로 유실시키지 않는다
    let mut dropped = 0usize;
    let mut total_rounds = 0usize;
    let mut total_retransmitted = 0usize;

    for batch in wire_packets.chunks(config.jitter_window / 2) {
        let mut batch: Vec<&(SequenceId, Bytes)> = batch.iter().collect();
        batch.shuffle(&mut rng);
        for (id, wire) in batch {
            if *id == last_id {
                receiver.push_stream(wire, |frame| recovered.push(frame.to_vec()));
            } else if !deliver(&mut receiver, wire, loss_rate, &mut rng, &mut recovered) {
                dropped += 1;
            }
        }

        let (rounds, retransmitted) = nack_rounds(
            &mut receiver,
            &mut sender_side,
            &sent,
            loss_rate,
            &mut rng,
            &mut recovered,
        );
        total_rounds += rounds;
        total_retransmitted += retransmitted;
    }

    info!(
        "전송 완료: {} packets 유실, {} NACK rounds, {} packets 재전송",
        dropped, total_rounds, total_retransmitted
    );

    // 검증
    assert_eq!(recovered.len(), frame_count, "프레임 수 불일치");
    for (i, (original, restored)) in originals.iter().zip(&recovered).enumerate() {
        assert_eq!(original, restored, "프레임 {} 내용 불일치", i);
    }

    let stats = receiver.stitcher_stats();
    info!(
        "검증 성공: {} frames, {} bytes 복원",
        frame_count, total_bytes
    );
    info!(
        "스티처 통계: packets={}, duplicates={}, rewinds={}, snaps={}",
        stats.packets, stats.duplicates, stats.rewinds, stats.window_snaps
    );
}

//! SQP 수신자 - Sequenced Fragment Protocol
//!
//! UDP로 단편 스트림을 받아 프레임으로 재조립하고, 누락 단편은
//! 주기적으로 NACK 요청을 보내 복구한다.
//!
//! 사용법:
//!   cargo run --release --bin sqp-receiver -- [OPTIONS]
//!
//! 예시:
//!   # 기본 수신
//!   cargo run --release --bin sqp-receiver -- --server 127.0.0.1:9000 --output received.bin
//!
//!   # 예상 크기 지정 (10MB)
//!   cargo run --release --bin sqp-receiver -- -s 127.0.0.1:9000 --size 10485760

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sqp::{Config, Session};

/// 수신자 설정
struct ReceiverConfig {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    output_path: Option<PathBuf>,
    expected_size: Option<usize>,
    idle_timeout_secs: u64,
    config: Config,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".parse().unwrap(),
            server_addr: "127.0.0.1:9000".parse().unwrap(),
            output_path: None,
            expected_size: None,
            idle_timeout_secs: 10,
            config: Config::default(),
        }
    }
}

fn parse_args() -> ReceiverConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ReceiverConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--size" => {
                if i + 1 < args.len() {
                    config.expected_size = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--window" => {
                if i + 1 < args.len() {
                    config.config.jitter_window = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"SQP Receiver - Sequenced Fragment Protocol 수신자

UDP 단편 스트림을 프레임으로 재조립하고 누락 단편은 NACK으로 복구한다.

사용법:
  cargo run --release --bin sqp-receiver -- [OPTIONS]

옵션:
  -b, --bind <ADDR>      로컬 바인드 주소 (기본: 0.0.0.0:0 = 자동 할당)
  -s, --server <ADDR>    송신자 주소 (기본: 127.0.0.1:9000)
  -o, --output <PATH>    수신 데이터 저장 경로
  --size <BYTES>         예상 데이터 크기 (도달 시 종료)
  --window <SLOTS>       지터 윈도우 용량 (기본: 50)
  -h, --help             이 도움말 출력

예시:
  # 송신자에서 파일 수신
  cargo run --release --bin sqp-receiver -- --server 192.168.1.100:9000 --output received.bin
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let receiver_config = parse_args();

    let socket = UdpSocket::bind(receiver_config.bind_addr).await?;
    info!("SQP Receiver started on {}", socket.local_addr()?);
    info!("송신자 주소: {}", receiver_config.server_addr);

    // 송신자에게 수신 준비를 알린다 (아무 데이터그램이면 된다)
    socket.send_to(&[0u8], receiver_config.server_addr).await?;

    let mut session = Session::new(0, receiver_config.config.clone());
    let mut received: Vec<u8> = Vec::new();
    let mut frame_count = 0u64;

    let nack_interval = Duration::from_millis(receiver_config.config.nack_interval_ms);
    let idle_timeout = Duration::from_secs(receiver_config.idle_timeout_secs);
    let start = Instant::now();
    let mut last_nack = Instant::now();
    let mut last_activity = Instant::now();
    let mut last_progress = Instant::now();
    let mut buf = vec![0u8; 65535];

    loop {
        // 완료 조건 체크
        if let Some(expected) = receiver_config.expected_size {
            if received.len() >= expected {
                info!("예상 크기 도달");
                break;
            }
        }
        if last_activity.elapsed() > idle_timeout {
            if received.is_empty() {
                warn!("타임아웃: 수신 데이터 없음");
            } else {
                info!("유휴 타임아웃, 수신 종료");
            }
            break;
        }

        // 패킷 수신
        match tokio::time::timeout(Duration::from_millis(50), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => {
                last_activity = Instant::now();
                session.push_stream(&buf[..len], |frame| {
                    received.extend_from_slice(frame);
                    frame_count += 1;
                });
            }
            Ok(Err(e)) => {
                warn!("수신 에러: {}", e);
            }
            Err(_) => {
                // 타임아웃, 계속
            }
        }

        // NACK 전송 (주기적)
        if last_nack.elapsed() > nack_interval {
            let lost = session.lost_packets();
            if !lost.is_empty() {
                let packets = session.build_nack();
                for packet in &packets {
                    socket.send_to(packet, receiver_config.server_addr).await?;
                }
                info!("NACK 전송: {} ids, {} packets", lost.len(), packets.len());
            }
            last_nack = Instant::now();
        }

        // 진행률 로깅 (2초마다)
        if last_progress.elapsed() > Duration::from_secs(2) {
            info!(
                "진행: {} frames, {} bytes 수신",
                frame_count,
                received.len()
            );
            last_progress = Instant::now();
        }
    }

    // === 결과 정리 ===
    let elapsed = start.elapsed();
    let stats = session.stitcher_stats();

    info!("수신 완료!");
    info!("  Time: {:.2}s", elapsed.as_secs_f64());
    info!("  Frames: {}", frame_count);
    info!("  Total bytes: {}", received.len());
    if elapsed.as_secs_f64() > 0.0 {
        info!(
            "  Throughput: {:.2} MB/s",
            received.len() as f64 / elapsed.as_secs_f64() / 1_000_000.0
        );
    }
    info!("  Fragments: {}", stats.packets);
    info!("  Duplicates: {}", stats.duplicates);
    info!("  Window snaps: {}", stats.window_snaps);

    // 파일 저장
    if let Some(output_path) = &receiver_config.output_path {
        std::fs::write(output_path, &received)?;
        info!("저장 완료: {:?}", output_path);
    }

    Ok(())
}

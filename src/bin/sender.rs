//! SQP 송신자 - Sequenced Fragment Protocol
//!
//! 파일을 프레임 단위로 쪼개 UDP로 전송하고, 수신측 NACK 요청에
//! 응답해 누락 단편을 재전송한다.
//!
//! 사용법:
//!   cargo run --release --bin sqp-sender -- [OPTIONS]
//!
//! 예시:
//!   # 파일 전송
//!   cargo run --release --bin sqp-sender -- --bind 0.0.0.0:9000 --file data.bin
//!
//!   # 테스트 데이터 생성 전송 (10MB)
//!   cargo run --release --bin sqp-sender -- --size 10

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sqp::{nack, Config, FragmentBuilder, PacketType, SequenceId, StreamFramer};

/// 송신자 설정
struct SenderConfig {
    bind_addr: SocketAddr,
    file_path: Option<PathBuf>,
    generate_mb: usize,
    frame_size: usize,
    idle_timeout_secs: u64,
    config: Config,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".parse().unwrap(),
            file_path: None,
            generate_mb: 10,
            frame_size: 64 * 1024,
            idle_timeout_secs: 10,
            config: Config::default(),
        }
    }
}

fn parse_args() -> SenderConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = SenderConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    config.file_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--size" => {
                if i + 1 < args.len() {
                    config.generate_mb = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--frame-size" => {
                if i + 1 < args.len() {
                    config.frame_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--fragment-size" => {
                if i + 1 < args.len() {
                    config.config.max_fragment_size =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"SQP Sender - Sequenced Fragment Protocol 송신자

파일을 프레임 단위로 쪼개 UDP로 전송하고, NACK 요청에 응답해
누락 단편을 재전송한다.

사용법:
  cargo run --release --bin sqp-sender -- [OPTIONS]

옵션:
  -b, --bind <ADDR>      바인드 주소 (기본: 0.0.0.0:9000)
  -f, --file <PATH>      전송할 파일 (없으면 테스트 데이터 생성)
  --size <MB>            생성할 테스트 데이터 크기 (기본: 10)
  --frame-size <BYTES>   프레임 크기 (기본: 65536)
  --fragment-size <BYTES> 단편 페이로드 크기 (기본: 1400)
  -h, --help             이 도움말 출력

예시:
  # 파일 전송
  cargo run --release --bin sqp-sender -- --bind 0.0.0.0:9000 --file data.bin

  # 100MB 테스트 데이터 전송
  cargo run --release --bin sqp-sender -- --size 100
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

/// 테스트용 패턴 데이터 생성
fn generate_test_data(size_mb: usize) -> Vec<u8> {
    let target = size_mb * 1024 * 1024;
    let mut data = Vec::with_capacity(target);
    let mut line = 0u64;
    while data.len() < target {
        data.extend_from_slice(format!("[{:08}] SQP test payload line\n", line).as_bytes());
        line += 1;
    }
    data.truncate(target);
    data
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let sender_config = parse_args();

    let data = match &sender_config.file_path {
        Some(path) => {
            info!("파일 읽기: {:?}", path);
            std::fs::read(path)?
        }
        None => {
            info!("테스트 데이터 생성: {} MB", sender_config.generate_mb);
            generate_test_data(sender_config.generate_mb)
        }
    };

    let socket = UdpSocket::bind(sender_config.bind_addr).await?;
    info!("SQP Sender started on {}", socket.local_addr()?);
    info!("수신자 접속 대기 중...");

    // 첫 데이터그램의 발신 주소를 수신자로 삼는다
    let mut buf = vec![0u8; 65535];
    let (_, peer) = socket.recv_from(&mut buf).await?;
    info!("수신자 연결: {}", peer);

    // === Phase 1: 전체 전송 ===
    let start = Instant::now();
    let mut builder = FragmentBuilder::new(0);
    let mut sent: HashMap<SequenceId, Bytes> = HashMap::new();
    let mut packet_count = 0u64;

    for frame in data.chunks(sender_config.frame_size) {
        for fragment in builder.split(sender_config.config.max_fragment_size, frame) {
            let id = fragment.sequence_id();
            let wire = fragment.into_bytes();
            socket.send_to(&wire, peer).await?;
            sent.insert(id, wire);
            packet_count += 1;

            // 송신 페이싱
            if packet_count % 32 == 0 {
                tokio::time::sleep(Duration::from_micros(500)).await;
            }
        }
    }

    info!(
        "1차 전송 완료: {} bytes, {} packets, {:.2}s",
        data.len(),
        packet_count,
        start.elapsed().as_secs_f64()
    );

    // === Phase 2: NACK 응답 ===
    let mut framer = StreamFramer::new();
    let mut retransmitted = 0u64;
    let idle_timeout = Duration::from_secs(sender_config.idle_timeout_secs);
    let mut last_activity = Instant::now();

    loop {
        if last_activity.elapsed() > idle_timeout {
            info!("유휴 타임아웃, 종료");
            break;
        }

        match tokio::time::timeout(Duration::from_millis(100), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => {
                let mut requested: Vec<SequenceId> = Vec::new();
                framer.push_stream(&buf[..len], |fragment| {
                    if fragment.packet_type() == PacketType::RequestNack {
                        match nack::decode(fragment.payload()) {
                            Ok(ids) => requested.extend(ids),
                            Err(e) => debug!("NACK 파싱 실패: {}", e),
                        }
                    }
                });

                if requested.is_empty() {
                    continue;
                }
                last_activity = Instant::now();

                debug!("재전송 요청: {} ids", requested.len());
                for id in requested {
                    match sent.get(&id) {
                        Some(wire) => {
                            socket.send_to(wire, peer).await?;
                            retransmitted += 1;
                        }
                        None => warn!("요청된 ID가 송신 기록에 없음: {}", id),
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("수신 에러: {}", e);
            }
            Err(_) => {
                // 타임아웃, 계속
            }
        }
    }

    info!("전송 종료: {} packets 재전송", retransmitted);
    Ok(())
}

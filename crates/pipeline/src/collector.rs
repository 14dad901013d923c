//! UDP syslog 수집기
//!
//! 비연결형 UDP 소켓으로 syslog 프레임을 수신합니다. 한 데이터그램에
//! 개행으로 구분된 여러 메시지가 담길 수 있으므로 줄 단위로 분리하여
//! 비어 있지 않은 줄마다 [`RawMessage`]를 하나씩 내보냅니다.
//!
//! 잘못된 바이트 시퀀스는 lossy 디코딩으로 대체되며 수신 루프를 중단시키지
//! 않습니다. 하류 채널이 가득 차면 `send().await`가 블로킹되어 역압이
//! 수신 루프까지 전파됩니다.

use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use palisade_core::types::RawMessage;

use crate::error::SiemError;

/// UDP 수집기 설정
#[derive(Debug, Clone)]
pub struct UdpCollectorConfig {
    /// 바인드 주소 (예: "0.0.0.0:514")
    pub bind_addr: String,
    /// 데이터그램 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,
}

impl Default for UdpCollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:514".to_owned(),
            recv_buffer_size: 8192,
        }
    }
}

/// UDP syslog 수집기
///
/// 소켓 바인드 실패는 치명적이며 [`UdpCollector::bind`]에서 즉시 반환됩니다.
/// 바인드 이후의 수신/디코딩 오류는 로그만 남기고 루프를 계속합니다.
pub struct UdpCollector {
    config: UdpCollectorConfig,
    socket: UdpSocket,
    tx: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
}

impl UdpCollector {
    /// 설정된 주소에 UDP 소켓을 바인드합니다.
    ///
    /// 바인드 실패는 시작을 중단시켜야 하므로 에러로 전파됩니다.
    pub async fn bind(
        config: UdpCollectorConfig,
        tx: mpsc::Sender<RawMessage>,
        cancel: CancellationToken,
    ) -> Result<Self, SiemError> {
        let socket = UdpSocket::bind(&config.bind_addr)
            .await
            .map_err(|e| SiemError::Collector {
                source_type: "syslog_udp".to_owned(),
                reason: format!("failed to bind {}: {}", config.bind_addr, e),
            })?;

        Ok(Self {
            config,
            socket,
            tx,
            cancel,
        })
    }

    /// 실제 바인드된 소켓 주소를 반환합니다.
    ///
    /// 포트 0으로 바인드한 경우 (테스트 등) 실제 할당 포트를 확인할 때 사용합니다.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, SiemError> {
        self.socket.local_addr().map_err(SiemError::Io)
    }

    /// 수신 루프를 실행합니다.
    ///
    /// 취소 토큰이 취소되거나 하류 채널이 닫힐 때까지 실행됩니다.
    pub async fn run(self) {
        tracing::info!(bind_addr = %self.config.bind_addr, "udp collector started");
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("udp collector stopping");
                    break;
                }
                result = self.socket.recv_from(&mut buf) => {
                    let (len, addr) = match result {
                        Ok(recv) => recv,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed, continuing");
                            continue;
                        }
                    };

                    if len == 0 {
                        continue;
                    }

                    // 잘못된 바이트는 대체 문자로 치환 (루프는 계속)
                    let text = String::from_utf8_lossy(&buf[..len]);
                    let received_at = Utc::now();

                    for line in text.lines() {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        let message = RawMessage {
                            line: line.to_owned(),
                            source_ip: addr.ip(),
                            source_port: addr.port(),
                            received_at,
                        };

                        metrics::counter!("palisade_collector_messages_total").increment(1);

                        // 채널이 가득 차면 여기서 대기 (역압)
                        if self.tx.send(message).await.is_err() {
                            tracing::warn!("raw message channel closed, stopping collector");
                            return;
                        }
                    }
                }
            }
        }
    }
}

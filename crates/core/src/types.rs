//! 도메인 타입 — 파이프라인 전 단계에서 사용되는 공통 타입
//!
//! 수집 → 파싱 → 인덱싱 → 룰 평가의 각 단계가 주고받는 데이터 구조를 정의합니다.
//! 모든 타입은 생성 이후 변경되지 않습니다 (Alert의 확인 상태만 예외).

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// syslog 심각도 코드(0~7)를 이름으로 변환합니다.
///
/// 0~7 범위를 벗어나면 `"Unknown"`을 반환합니다.
pub fn severity_name(severity: u8) -> &'static str {
    match severity {
        0 => "Emergency",
        1 => "Alert",
        2 => "Critical",
        3 => "Error",
        4 => "Warning",
        5 => "Notice",
        6 => "Informational",
        7 => "Debug",
        _ => "Unknown",
    }
}

/// 원시 메시지
///
/// 수집기가 UDP 데이터그램을 줄 단위로 분리하여 생성합니다.
/// 한 데이터그램에 여러 줄이 담겨 있으면 줄마다 하나씩 만들어집니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// 원시 로그 한 줄 (개행 제거, lossy 디코딩 적용)
    pub line: String,
    /// 송신 측 IP
    pub source_ip: IpAddr,
    /// 송신 측 포트
    pub source_port: u16,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}

/// 정규화된 이벤트
///
/// 파서가 형식 패턴 매칭으로 생성합니다. 어떤 패턴에도 매칭되지 않으면
/// `pattern == "unmatched"`이고 원문이 `message`에 그대로 담깁니다.
///
/// `facility`와 `severity`는 priority에서 결정적으로 유도됩니다:
/// `facility = priority >> 3`, `severity = priority & 0x07`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// 원시 로그 원문
    pub raw: String,
    /// 매칭된 형식 이름 ("standard", "rfc3164", "rfc5424", "unmatched")
    pub pattern: String,
    /// syslog PRI 값 (0~191)
    pub priority: Option<u16>,
    /// facility 코드 (priority >> 3)
    pub facility: Option<u16>,
    /// 심각도 코드 (priority & 7)
    pub severity: Option<u8>,
    /// 심각도 이름 (Emergency ~ Debug, 범위 밖은 Unknown)
    pub severity_name: Option<String>,
    /// 프레임에 기록된 타임스탬프 원문
    pub timestamp: Option<String>,
    /// 호스트명
    pub hostname: Option<String>,
    /// 프로세스명
    pub process: Option<String>,
    /// 프로세스 ID
    pub pid: Option<String>,
    /// 애플리케이션 이름 (RFC 5424 APP-NAME)
    pub app_name: Option<String>,
    /// 로그 메시지 본문
    pub message: String,
    /// 송신 측 IP
    pub source_ip: IpAddr,
    /// 송신 측 포트
    pub source_port: u16,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
    /// 파싱 시각
    pub parsed_at: DateTime<Utc>,
}

impl NormalizedEvent {
    /// 어떤 패턴에도 매칭되지 않은 메시지를 best-effort 이벤트로 변환합니다.
    pub fn unmatched(raw: &RawMessage, parsed_at: DateTime<Utc>) -> Self {
        Self {
            raw: raw.line.clone(),
            pattern: "unmatched".to_owned(),
            priority: None,
            facility: None,
            severity: None,
            severity_name: None,
            timestamp: None,
            hostname: None,
            process: None,
            pid: None,
            app_name: None,
            message: raw.line.clone(),
            source_ip: raw.source_ip,
            source_port: raw.source_port,
            received_at: raw.received_at,
            parsed_at,
        }
    }

    /// 이름으로 이벤트 필드를 조회합니다.
    ///
    /// 룰 엔진의 `group_by` 키 해석에 사용됩니다.
    /// 값이 없는 필드는 `None`을 반환합니다.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "source_ip" => Some(self.source_ip.to_string()),
            "source_port" => Some(self.source_port.to_string()),
            "hostname" => self.hostname.clone(),
            "process" => self.process.clone(),
            "pid" => self.pid.clone(),
            "app_name" => self.app_name.clone(),
            "severity_name" => self.severity_name.clone(),
            "pattern" => Some(self.pattern.clone()),
            "message" => Some(self.message.clone()),
            "raw" => Some(self.raw.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for NormalizedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.pattern,
            self.hostname.as_deref().unwrap_or("-"),
            self.process.as_deref().unwrap_or("-"),
            self.message,
        )
    }
}

/// 저장된 이벤트
///
/// 인덱서가 배치 커밋에 성공한 시점에 정확히 한 번 식별자를 부여합니다.
/// 식별자는 이벤트 수명 동안 불변입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEvent {
    /// 데이터스토어가 부여한 식별자
    pub id: i64,
    /// 정규화된 이벤트
    pub event: NormalizedEvent,
}

/// 보안 알림
///
/// 룰 엔진이 생성하며, 확인(acknowledge) 상태만 외부 관리 인터페이스를 통해
/// 변경됩니다. 코어는 알림을 삭제하지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 식별자
    pub id: i64,
    /// 매칭된 룰 ID
    pub rule_id: String,
    /// 매칭된 룰 이름
    pub rule_name: String,
    /// 심각도 라벨 (룰에 정의된 값)
    pub severity: String,
    /// 상세 설명
    pub description: String,
    /// 트리거한 이벤트 식별자 (있을 경우)
    pub event_id: Option<i64>,
    /// 관련 소스 IP
    pub source_ip: Option<String>,
    /// 관련 대상 IP
    pub destination_ip: Option<String>,
    /// 확인 여부
    pub acknowledged: bool,
    /// 확인자
    pub acknowledged_by: Option<String>,
    /// 확인 시각
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (rule: {})",
            self.severity, self.rule_name, self.rule_id,
        )
    }
}

/// 저장 전 알림 데이터
///
/// 룰 엔진이 생성하여 `save_alert`로 전달하는 삽입 페이로드입니다.
/// 식별자와 생성 시각은 저장 시점에 부여됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    /// 매칭된 룰 ID
    pub rule_id: String,
    /// 매칭된 룰 이름
    pub rule_name: String,
    /// 심각도 라벨
    pub severity: String,
    /// 상세 설명
    pub description: String,
    /// 트리거한 이벤트 식별자 (있을 경우)
    pub event_id: Option<i64>,
    /// 관련 소스 IP
    pub source_ip: Option<String>,
    /// 관련 대상 IP
    pub destination_ip: Option<String>,
}

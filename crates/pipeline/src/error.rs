//! 파이프라인 에러 타입
//!
//! [`SiemError`]는 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<SiemError> for PalisadeError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 형식 미매칭(ParseMiss)은 에러가 아닙니다. 파서는 매칭 실패 시
//! `pattern == "unmatched"` 이벤트를 생성하며 에러를 반환하지 않습니다.

use palisade_core::error::{PalisadeError, PipelineError};

/// 파이프라인 도메인 에러
///
/// 수집, 저장, 룰 로딩, 채널 통신 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum SiemError {
    /// 수집기 에러 (소켓 바인드 실패는 시작을 중단시키는 치명적 에러)
    #[error("collector error: {source_type}: {reason}")]
    Collector {
        /// 수집 소스 유형 (syslog_udp 등)
        source_type: String,
        /// 에러 사유
        reason: String,
    },

    /// 데이터스토어 에러 (배치 단위로 복구: 롤백 후 배치 폐기)
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// 룰 파일 로딩 실패 (파일 단위로 복구: 해당 파일만 건너뜀)
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 룰 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 룰 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 설정 에러 (시작 전 치명적)
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<SiemError> for PalisadeError {
    fn from(err: SiemError) -> Self {
        PalisadeError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_error_display() {
        let err = SiemError::Collector {
            source_type: "syslog_udp".to_owned(),
            reason: "address in use".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("syslog_udp"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn rule_load_error_display() {
        let err = SiemError::RuleLoad {
            path: "/etc/palisade/rules/auth.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        };
        assert!(err.to_string().contains("auth.yml"));
    }

    #[test]
    fn rule_validation_error_display() {
        let err = SiemError::RuleValidation {
            rule_id: "ssh_brute_force".to_owned(),
            reason: "threshold must be greater than 0".to_owned(),
        };
        assert!(err.to_string().contains("ssh_brute_force"));
    }

    #[test]
    fn converts_to_palisade_error() {
        let err = SiemError::Channel("receiver closed".to_owned());
        let top: PalisadeError = err.into();
        assert!(matches!(top, PalisadeError::Pipeline(_)));
    }
}

//! 에러 타입 — 도메인별 에러 정의

/// Palisade 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum PalisadeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중인 파이프라인을 다시 시작하려고 함
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 파이프라인을 정지하려고 함
    #[error("pipeline is not running")]
    NotRunning,
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = PalisadeError::Config(ConfigError::InvalidValue {
            field: "collector.bind_addr".to_owned(),
            reason: "not a socket address".to_owned(),
        });
        let msg = err.to_string();
        assert!(msg.contains("collector.bind_addr"));
        assert!(msg.contains("not a socket address"));
    }

    #[test]
    fn pipeline_error_from_conversion() {
        let err: PalisadeError = PipelineError::AlreadyRunning.into();
        assert!(matches!(err, PalisadeError::Pipeline(_)));
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::Query("no such table: events".to_owned());
        assert!(err.to_string().contains("no such table"));
    }
}

//! 설정 관리 — palisade.toml 파싱 및 런타임 설정
//!
//! [`PalisadeConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PALISADE_COLLECTOR_BIND_ADDR=0.0.0.0:5140` 형식)
//! 3. 설정 파일 (`palisade.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), palisade_core::error::PalisadeError> {
//! use palisade_core::config::PalisadeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = PalisadeConfig::load("palisade.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PalisadeConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PalisadeError};

/// Palisade 통합 설정
///
/// `palisade.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PalisadeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집기 설정
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 인덱서 설정
    #[serde(default)]
    pub indexer: IndexerConfig,
    /// 룰 엔진 설정
    #[serde(default)]
    pub rules: RulesConfig,
}

impl PalisadeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PalisadeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PalisadeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PalisadeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PalisadeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PalisadeError> {
        toml::from_str(toml_str).map_err(|e| {
            PalisadeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PALISADE_{SECTION}_{FIELD}`
    /// 예: `PALISADE_COLLECTOR_BIND_ADDR=0.0.0.0:5140`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PALISADE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PALISADE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "PALISADE_GENERAL_DATA_DIR");

        // Collector
        override_string(
            &mut self.collector.bind_addr,
            "PALISADE_COLLECTOR_BIND_ADDR",
        );
        override_usize(
            &mut self.collector.recv_buffer_size,
            "PALISADE_COLLECTOR_RECV_BUFFER_SIZE",
        );
        override_usize(
            &mut self.collector.channel_capacity,
            "PALISADE_COLLECTOR_CHANNEL_CAPACITY",
        );

        // Indexer
        override_string(&mut self.indexer.db_path, "PALISADE_INDEXER_DB_PATH");
        override_usize(&mut self.indexer.batch_size, "PALISADE_INDEXER_BATCH_SIZE");
        override_u64(
            &mut self.indexer.flush_interval_secs,
            "PALISADE_INDEXER_FLUSH_INTERVAL_SECS",
        );

        // Rules
        override_string(&mut self.rules.rules_dir, "PALISADE_RULES_RULES_DIR");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PalisadeError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // bind_addr 검증
        if self.collector.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "collector.bind_addr".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.collector.bind_addr),
            }
            .into());
        }

        if self.collector.recv_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "collector.recv_buffer_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.collector.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "collector.channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.indexer.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "indexer.batch_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.indexer.flush_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "indexer.flush_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.indexer.db_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "indexer.db_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.rules.rules_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rules.rules_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/palisade".to_owned(),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// UDP 바인드 주소 (예: "0.0.0.0:514")
    pub bind_addr: String,
    /// 데이터그램 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,
    /// 단계 간 채널 용량 (메시지 수)
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:514".to_owned(),
            recv_buffer_size: 8192,
            channel_capacity: 10_000,
        }
    }
}

/// 인덱서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// SQLite 데이터베이스 경로
    pub db_path: String,
    /// 배치 크기 (이벤트 수)
    pub batch_size: usize,
    /// 유휴 플러시 간격 (초)
    pub flush_interval_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            db_path: "/var/lib/palisade/events.db".to_owned(),
            batch_size: 10,
            flush_interval_secs: 1,
        }
    }
}

/// 룰 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// YAML 룰 파일 디렉토리
    pub rules_dir: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rules_dir: "/etc/palisade/rules".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = PalisadeConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.collector.bind_addr, "0.0.0.0:514");
        assert_eq!(config.indexer.batch_size, 10);
        assert_eq!(config.indexer.flush_interval_secs, 1);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = PalisadeConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = PalisadeConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.collector.channel_capacity, 10_000);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[collector]
bind_addr = "127.0.0.1:5140"
"#;
        let config = PalisadeConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.collector.bind_addr, "127.0.0.1:5140");
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"
data_dir = "/opt/palisade/data"

[collector]
bind_addr = "127.0.0.1:5140"
recv_buffer_size = 16384
channel_capacity = 5000

[indexer]
db_path = "/opt/palisade/events.db"
batch_size = 50
flush_interval_secs = 2

[rules]
rules_dir = "/opt/palisade/rules"
"#;
        let config = PalisadeConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.collector.recv_buffer_size, 16384);
        assert_eq!(config.indexer.batch_size, 50);
        assert_eq!(config.rules.rules_dir, "/opt/palisade/rules");
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = PalisadeConfig::parse("invalid = [[[toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            PalisadeError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = PalisadeConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_bind_addr() {
        let mut config = PalisadeConfig::default();
        config.collector.bind_addr = "not-an-address".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bind_addr"));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = PalisadeConfig::default();
        config.indexer.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn validate_rejects_zero_flush_interval() {
        let mut config = PalisadeConfig::default();
        config.indexer.flush_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("flush_interval_secs"));
    }

    #[test]
    fn validate_rejects_empty_rules_dir() {
        let mut config = PalisadeConfig::default();
        config.rules.rules_dir = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rules_dir"));
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut config = PalisadeConfig::default();
        // SAFETY: 테스트는 serial_test로 직렬화되어 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("PALISADE_GENERAL_LOG_LEVEL", "trace") };
        config.apply_env_overrides();
        assert_eq!(config.general.log_level, "trace");
        unsafe { std::env::remove_var("PALISADE_GENERAL_LOG_LEVEL") };
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_keeps_original() {
        let mut config = PalisadeConfig::default();
        // SAFETY: 테스트는 serial_test로 직렬화되어 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("PALISADE_INDEXER_BATCH_SIZE", "not-a-number") };
        config.apply_env_overrides();
        assert_eq!(config.indexer.batch_size, 10); // 원래 값 유지
        unsafe { std::env::remove_var("PALISADE_INDEXER_BATCH_SIZE") };
    }

    #[test]
    #[serial]
    fn env_override_missing_var_keeps_original() {
        let mut config = PalisadeConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.collector.bind_addr, "0.0.0.0:514");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = PalisadeConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = PalisadeConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.collector.bind_addr, parsed.collector.bind_addr);
        assert_eq!(config.indexer.batch_size, parsed.indexer.batch_size);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = PalisadeConfig::from_file("/nonexistent/path/palisade.toml").await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            PalisadeError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}

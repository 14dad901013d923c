//! 룰 데이터 구조 정의
//!
//! # 룰 파일 형식
//! ```yaml
//! rules:
//!   - id: ssh_brute_force
//!     name: SSH Brute Force Attempt
//!     severity: high
//!     description: Repeated failed SSH logins from one source
//!     conditions:
//!       message_pattern: "Failed password"
//!       process_pattern: "sshd"
//!       threshold: 5
//!       time_window: 300
//!       group_by: source_ip
//! ```
//!
//! `conditions`의 모든 키는 선택이며, 조건이 하나도 없는 룰은 모든
//! 이벤트에 매칭됩니다 (허용적 기본 정책). 설정된 조건들은 AND로
//! 결합됩니다.

use regex::RegexBuilder;
use serde::Deserialize;

use crate::error::SiemError;

/// 룰 파일 최상위 구조
#[derive(Debug, Clone, Deserialize)]
pub struct RuleFile {
    /// 룰 목록
    pub rules: Vec<Rule>,
}

/// 탐지 룰
///
/// 로드 이후 불변입니다. 룰 세트 교체는 전체 단위로만 이루어집니다.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    /// 룰 식별자 (로드된 세트 내에서 유일)
    pub id: String,
    /// 룰 이름
    pub name: String,
    /// 심각도 라벨
    #[serde(default = "default_severity")]
    pub severity: String,
    /// 상세 설명
    #[serde(default)]
    pub description: String,
    /// 매칭 조건
    #[serde(default)]
    pub conditions: RuleConditions,
}

/// 룰 매칭 조건 (모두 선택, AND 결합)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    /// 메시지 정규식 (대소문자 무시)
    pub message_pattern: Option<String>,
    /// 프로세스명 정규식 (대소문자 무시)
    pub process_pattern: Option<String>,
    /// 윈도우 내 발생 횟수 임계값
    pub threshold: Option<u64>,
    /// 슬라이딩 윈도우 길이 (초)
    pub time_window: u64,
    /// 윈도우를 분할할 그룹 키 필드명
    pub group_by: String,
}

impl Default for RuleConditions {
    fn default() -> Self {
        Self {
            message_pattern: None,
            process_pattern: None,
            threshold: None,
            time_window: 3600,
            group_by: "source_ip".to_owned(),
        }
    }
}

fn default_severity() -> String {
    "medium".to_owned()
}

impl Rule {
    /// 룰의 유효성을 검증합니다.
    ///
    /// 정규식 패턴의 컴파일 가능 여부까지 여기서 확인하므로,
    /// 검증을 통과한 룰은 엔진 설치 시점에 실패하지 않습니다.
    pub fn validate(&self) -> Result<(), SiemError> {
        if self.id.is_empty() {
            return Err(SiemError::RuleValidation {
                rule_id: "<empty>".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }
        if self.name.is_empty() {
            return Err(SiemError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule name must not be empty".to_owned(),
            });
        }
        if self.conditions.threshold == Some(0) {
            return Err(SiemError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "threshold must be greater than 0".to_owned(),
            });
        }
        if self.conditions.threshold.is_some() && self.conditions.time_window == 0 {
            return Err(SiemError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "time_window must be greater than 0".to_owned(),
            });
        }
        if self.conditions.threshold.is_some() && self.conditions.group_by.is_empty() {
            return Err(SiemError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "group_by must not be empty".to_owned(),
            });
        }

        for (field, pattern) in [
            ("message_pattern", &self.conditions.message_pattern),
            ("process_pattern", &self.conditions.process_pattern),
        ] {
            if let Some(pattern) = pattern {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| SiemError::RuleValidation {
                        rule_id: self.id.clone(),
                        reason: format!("invalid {field}: {e}"),
                    })?;
            }
        }

        Ok(())
    }

    /// threshold 조건이 있는 룰인지 확인합니다.
    pub fn has_threshold(&self) -> bool {
        self.conditions.threshold.is_some()
    }
}

//! YAML 룰 파일 로딩
//!
//! 디렉토리의 `.yml`/`.yaml` 파일을 순회하며 룰을 로드합니다.
//! 로딩은 파일 단위로 all-or-nothing입니다: 한 파일 안의 룰이 하나라도
//! 잘못되면 그 파일 전체를 건너뛰고 (큰 소리로 로깅), 나머지 파일은
//! 계속 로드합니다. 중복 ID는 먼저 로드된 룰이 우선합니다.

use std::collections::HashSet;
use std::path::Path;

use crate::error::SiemError;
use crate::rule::types::{Rule, RuleFile};

/// 룰 파일 최대 크기 (바이트)
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// 룰 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리에서 룰을 로드합니다.
    ///
    /// 개별 파일의 실패는 경고만 남기고 건너뜁니다. 디렉토리 자체를
    /// 읽을 수 없으면 에러를 반환합니다.
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<Vec<Rule>, SiemError> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| SiemError::RuleLoad {
            path: dir.display().to_string(),
            reason: format!("failed to read rules directory: {e}"),
        })?;

        let mut rules = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        while let Some(entry) = entries.next_entry().await.map_err(SiemError::Io)? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if !is_yaml {
                continue;
            }

            match Self::load_file(&path).await {
                Ok(file_rules) => {
                    for rule in file_rules {
                        if !seen_ids.insert(rule.id.clone()) {
                            tracing::warn!(
                                rule_id = rule.id.as_str(),
                                path = %path.display(),
                                "duplicate rule id, skipping"
                            );
                            continue;
                        }
                        tracing::debug!(rule_id = rule.id.as_str(), "loaded rule");
                        rules.push(rule);
                    }
                }
                Err(e) => {
                    // 파일 단위 복구: 이 파일만 건너뛰고 계속
                    tracing::warn!(path = %path.display(), error = %e, "skipping rule file");
                }
            }
        }

        Ok(rules)
    }

    /// 단일 룰 파일을 로드하고 검증합니다.
    ///
    /// 파일 안의 룰이 하나라도 유효하지 않으면 파일 전체가 실패합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Vec<Rule>, SiemError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path).await.map_err(SiemError::Io)?;
        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(SiemError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path).await.map_err(SiemError::Io)?;
        let file: RuleFile =
            serde_yaml::from_str(&content).map_err(|e| SiemError::RuleLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        for rule in &file.rules {
            rule.validate()?;
        }

        Ok(file.rules)
    }
}

//! 탐지 룰 엔진 — YAML 룰 로딩 및 슬라이딩 윈도우 threshold 평가
//!
//! 저장된 모든 이벤트를 로드된 모든 룰에 대해 평가합니다. 룰 간
//! 조기 종료는 없습니다 (룰은 서로 독립적입니다).
//!
//! # threshold 룰 상태 기계
//! (룰, 그룹) 쌍마다: **idle → accumulating → fired → idle**
//! - 조건에 부합하는 이벤트마다 타임스탬프를 추가하고 윈도우 밖 항목을 제거
//! - count < threshold 동안 accumulating
//! - count ≥ threshold가 되는 순간 알림 하나를 발화하고 윈도우를 비움
//!   (같은 버스트에 대한 즉각적 재발화 방지)
//!
//! # 아키텍처
//! - [`RuleEngine`]: 불변 룰 세트 + 가변 윈도우 상태를 소유하는 명시적 인스턴스
//! - [`loader`]: YAML 파일 로딩 및 유효성 검증
//! - [`types`]: 룰 데이터 구조 정의

pub mod loader;
pub mod types;

pub use loader::RuleLoader;
pub use types::{Rule, RuleConditions, RuleFile};

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};

use palisade_core::types::{NewAlert, PersistedEvent};

use crate::error::SiemError;

/// (룰, 그룹)별 윈도우에 보관하는 타임스탬프 상한
const WINDOW_CAP: usize = 1000;

/// 룰 발화 결과
#[derive(Debug, Clone)]
pub struct RuleFired {
    /// 매칭된 룰 ID
    pub rule_id: String,
    /// 매칭된 룰 이름
    pub rule_name: String,
    /// 심각도 라벨
    pub severity: String,
    /// 상세 설명
    pub description: String,
    /// threshold 룰이면 발화 시점의 윈도우 내 발생 횟수
    pub count: Option<u64>,
}

impl RuleFired {
    /// 발화 결과를 저장용 알림 데이터로 변환합니다.
    pub fn to_alert(&self, event: &PersistedEvent) -> NewAlert {
        NewAlert {
            rule_id: self.rule_id.clone(),
            rule_name: self.rule_name.clone(),
            severity: self.severity.clone(),
            description: self.description.clone(),
            event_id: Some(event.id),
            source_ip: Some(event.event.source_ip.to_string()),
            destination_ip: None,
        }
    }
}

/// 컴파일된 룰 (룰 정의 + 사전 컴파일된 정규식)
struct CompiledRule {
    rule: Rule,
    message_pattern: Option<Regex>,
    process_pattern: Option<Regex>,
}

/// 룰 엔진
///
/// 불변 룰 세트와 (룰 ID, 그룹 값) → 타임스탬프 윈도우 맵을 소유합니다.
/// 룰 세트는 제자리에서 변경되지 않으며 [`RuleEngine::replace_rules`]로만
/// 통째로 교체됩니다. 전역 상태가 없으므로 한 프로세스에서 여러 엔진을
/// 독립적으로 테스트할 수 있습니다.
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    windows: HashMap<(String, String), VecDeque<DateTime<Utc>>>,
}

impl RuleEngine {
    /// 빈 룰 세트로 엔진을 생성합니다.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            windows: HashMap::new(),
        }
    }

    /// 디렉토리에서 룰을 로드하여 설치하고, 로드된 룰 수를 반환합니다.
    pub async fn load_from_dir(
        &mut self,
        dir: impl AsRef<std::path::Path>,
    ) -> Result<usize, SiemError> {
        let rules = RuleLoader::load_directory(dir).await?;
        self.replace_rules(rules)
    }

    /// 룰 세트를 통째로 교체합니다.
    ///
    /// 모든 룰의 컴파일이 성공해야 교체가 일어납니다 (원자적 스왑).
    /// 기존 윈도우 상태는 폐기됩니다.
    pub fn replace_rules(&mut self, rules: Vec<Rule>) -> Result<usize, SiemError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            compiled.push(compile_rule(rule)?);
        }
        let count = compiled.len();
        self.rules = compiled;
        self.windows.clear();
        Ok(count)
    }

    /// 로드된 룰 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 활성 (룰, 그룹) 윈도우 수를 반환합니다.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// 저장된 이벤트 하나를 모든 룰에 대해 평가합니다.
    ///
    /// `now`를 인자로 받아 threshold 윈도우 평가를 결정적으로 테스트할 수
    /// 있습니다. 운영 코드는 `Utc::now()`를 전달합니다.
    pub fn evaluate(&mut self, event: &PersistedEvent, now: DateTime<Utc>) -> Vec<RuleFired> {
        let mut fired = Vec::new();

        for compiled in &self.rules {
            let rule = &compiled.rule;

            // (a) 메시지 패턴: message가 비어 있으면 원문으로 폴백
            if let Some(ref pattern) = compiled.message_pattern {
                let haystack = if event.event.message.is_empty() {
                    &event.event.raw
                } else {
                    &event.event.message
                };
                if !pattern.is_match(haystack) {
                    continue;
                }
            }

            // (b) 프로세스 패턴
            if let Some(ref pattern) = compiled.process_pattern {
                let process = event.event.process.as_deref().unwrap_or("");
                if !pattern.is_match(process) {
                    continue;
                }
            }

            // (c) threshold 윈도우 / (d) 조건 없는 룰은 항상 매칭
            if let Some(threshold) = rule.conditions.threshold {
                let group_value = event
                    .event
                    .field(&rule.conditions.group_by)
                    .unwrap_or_else(|| "unknown".to_owned());
                let key = (rule.id.clone(), group_value);

                let window = self.windows.entry(key).or_default();
                window.push_back(now);
                if window.len() > WINDOW_CAP {
                    window.pop_front();
                }

                // 윈도우 밖 타임스탬프 제거 (cutoff 경계는 제외)
                let cutoff = now - Duration::seconds(rule.conditions.time_window as i64);
                while window.front().is_some_and(|t| *t <= cutoff) {
                    window.pop_front();
                }

                let count = window.len() as u64;
                if count >= threshold {
                    // 발화 후 윈도우 초기화: 같은 버스트로 즉시 재발화하지 않음
                    window.clear();
                    fired.push(RuleFired {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        severity: rule.severity.clone(),
                        description: rule.description.clone(),
                        count: Some(count),
                    });
                }
            } else {
                fired.push(RuleFired {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    severity: rule.severity.clone(),
                    description: rule.description.clone(),
                    count: None,
                });
            }
        }

        if !fired.is_empty() {
            metrics::counter!("palisade_rules_fired_total").increment(fired.len() as u64);
        }
        fired
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_rule(rule: Rule) -> Result<CompiledRule, SiemError> {
    let compile = |pattern: &Option<String>| -> Result<Option<Regex>, SiemError> {
        pattern
            .as_ref()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| SiemError::RuleValidation {
                        rule_id: rule.id.clone(),
                        reason: e.to_string(),
                    })
            })
            .transpose()
    };

    let message_pattern = compile(&rule.conditions.message_pattern)?;
    let process_pattern = compile(&rule.conditions.process_pattern)?;

    Ok(CompiledRule {
        rule,
        message_pattern,
        process_pattern,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::types::{NormalizedEvent, RawMessage};

    fn event_from(source_ip: &str, process: Option<&str>, message: &str) -> PersistedEvent {
        let raw = RawMessage {
            line: message.to_owned(),
            source_ip: source_ip.parse().unwrap(),
            source_port: 514,
            received_at: Utc::now(),
        };
        let mut event = NormalizedEvent::unmatched(&raw, Utc::now());
        event.message = message.to_owned();
        event.process = process.map(str::to_owned);
        PersistedEvent { id: 1, event }
    }

    fn rule(id: &str, conditions: RuleConditions) -> Rule {
        Rule {
            id: id.to_owned(),
            name: format!("Rule {id}"),
            severity: "high".to_owned(),
            description: String::new(),
            conditions,
        }
    }

    fn engine_with(rules: Vec<Rule>) -> RuleEngine {
        let mut engine = RuleEngine::new();
        engine.replace_rules(rules).unwrap();
        engine
    }

    #[test]
    fn conditionless_rule_always_matches() {
        let mut engine = engine_with(vec![rule("catch_all", RuleConditions::default())]);
        let event = event_from("10.0.0.1", None, "anything at all");
        let fired = engine.evaluate(&event, Utc::now());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_id, "catch_all");
        assert!(fired[0].count.is_none());
    }

    #[test]
    fn message_pattern_is_case_insensitive() {
        let conditions = RuleConditions {
            message_pattern: Some("failed password".to_owned()),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("ssh", conditions)]);

        let hit = event_from("10.0.0.1", None, "FAILED Password for root");
        assert_eq!(engine.evaluate(&hit, Utc::now()).len(), 1);

        let miss = event_from("10.0.0.1", None, "accepted publickey");
        assert!(engine.evaluate(&miss, Utc::now()).is_empty());
    }

    #[test]
    fn message_pattern_falls_back_to_raw_text() {
        let conditions = RuleConditions {
            message_pattern: Some("segfault".to_owned()),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("crash", conditions)]);

        let raw = RawMessage {
            line: "kernel segfault at 0xdead".to_owned(),
            source_ip: "10.0.0.1".parse().unwrap(),
            source_port: 514,
            received_at: Utc::now(),
        };
        let mut event = NormalizedEvent::unmatched(&raw, Utc::now());
        event.message = String::new();
        let event = PersistedEvent { id: 1, event };

        assert_eq!(engine.evaluate(&event, Utc::now()).len(), 1);
    }

    #[test]
    fn process_pattern_short_circuits() {
        let conditions = RuleConditions {
            message_pattern: Some("failed".to_owned()),
            process_pattern: Some("sshd".to_owned()),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("ssh", conditions)]);

        let wrong_process = event_from("10.0.0.1", Some("cron"), "failed job");
        assert!(engine.evaluate(&wrong_process, Utc::now()).is_empty());

        let no_process = event_from("10.0.0.1", None, "failed job");
        assert!(engine.evaluate(&no_process, Utc::now()).is_empty());

        let hit = event_from("10.0.0.1", Some("sshd"), "failed password");
        assert_eq!(engine.evaluate(&hit, Utc::now()).len(), 1);
    }

    #[test]
    fn threshold_fires_exactly_once_then_window_resets() {
        let conditions = RuleConditions {
            threshold: Some(3),
            time_window: 60,
            group_by: "source_ip".to_owned(),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("burst", conditions)]);
        let event = event_from("10.0.0.1", None, "qualifying");
        let base = Utc::now();

        // t=0, 10: accumulating
        assert!(engine.evaluate(&event, base).is_empty());
        assert!(engine.evaluate(&event, base + Duration::seconds(10)).is_empty());

        // t=20: 세 번째 이벤트에서 정확히 한 번 발화
        let fired = engine.evaluate(&event, base + Duration::seconds(20));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].count, Some(3));

        // t=30, 90: 윈도우가 비워졌으므로 재발화 없음
        assert!(engine.evaluate(&event, base + Duration::seconds(30)).is_empty());
        assert!(engine.evaluate(&event, base + Duration::seconds(90)).is_empty());
    }

    #[test]
    fn threshold_can_refire_after_fresh_accumulation() {
        let conditions = RuleConditions {
            threshold: Some(2),
            time_window: 60,
            group_by: "source_ip".to_owned(),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("burst", conditions)]);
        let event = event_from("10.0.0.1", None, "qualifying");
        let base = Utc::now();

        assert!(engine.evaluate(&event, base).is_empty());
        assert_eq!(engine.evaluate(&event, base + Duration::seconds(5)).len(), 1);

        // 초기화 이후 새 윈도우에서 다시 임계값에 도달하면 재발화
        assert!(engine.evaluate(&event, base + Duration::seconds(10)).is_empty());
        assert_eq!(engine.evaluate(&event, base + Duration::seconds(15)).len(), 1);
    }

    #[test]
    fn threshold_prunes_timestamps_outside_window() {
        let conditions = RuleConditions {
            threshold: Some(3),
            time_window: 60,
            group_by: "source_ip".to_owned(),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("burst", conditions)]);
        let event = event_from("10.0.0.1", None, "qualifying");
        let base = Utc::now();

        // 두 이벤트가 윈도우 밖으로 밀려나면 카운트가 다시 시작됨
        assert!(engine.evaluate(&event, base).is_empty());
        assert!(engine.evaluate(&event, base + Duration::seconds(10)).is_empty());
        assert!(engine.evaluate(&event, base + Duration::seconds(120)).is_empty());
        assert!(engine.evaluate(&event, base + Duration::seconds(130)).is_empty());
        // 120, 130, 140 세 개가 윈도우 안에 있으므로 발화
        let fired = engine.evaluate(&event, base + Duration::seconds(140));
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn threshold_groups_are_independent() {
        let conditions = RuleConditions {
            threshold: Some(2),
            time_window: 60,
            group_by: "source_ip".to_owned(),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("burst", conditions)]);
        let base = Utc::now();

        let first = event_from("10.0.0.1", None, "qualifying");
        let second = event_from("10.0.0.2", None, "qualifying");

        assert!(engine.evaluate(&first, base).is_empty());
        assert!(engine.evaluate(&second, base).is_empty());
        assert_eq!(engine.window_count(), 2);

        // 각 소스가 독립적으로 임계값에 도달
        assert_eq!(engine.evaluate(&first, base + Duration::seconds(1)).len(), 1);
        assert_eq!(engine.evaluate(&second, base + Duration::seconds(2)).len(), 1);
    }

    #[test]
    fn missing_group_field_falls_back_to_unknown() {
        let conditions = RuleConditions {
            threshold: Some(2),
            time_window: 60,
            group_by: "hostname".to_owned(),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("burst", conditions)]);
        let base = Utc::now();

        // hostname이 없는 서로 다른 소스의 이벤트가 같은 "unknown" 그룹에 누적
        let first = event_from("10.0.0.1", None, "qualifying");
        let second = event_from("10.0.0.2", None, "qualifying");
        assert!(engine.evaluate(&first, base).is_empty());
        assert_eq!(engine.evaluate(&second, base + Duration::seconds(1)).len(), 1);
        assert_eq!(engine.window_count(), 1);
    }

    #[test]
    fn every_event_is_checked_against_every_rule() {
        let mut engine = engine_with(vec![
            rule("first", RuleConditions::default()),
            rule("second", RuleConditions::default()),
        ]);
        let event = event_from("10.0.0.1", None, "anything");
        let fired = engine.evaluate(&event, Utc::now());
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn replace_rules_clears_window_state() {
        let conditions = RuleConditions {
            threshold: Some(3),
            time_window: 60,
            group_by: "source_ip".to_owned(),
            ..Default::default()
        };
        let mut engine = engine_with(vec![rule("burst", conditions.clone())]);
        let event = event_from("10.0.0.1", None, "qualifying");
        engine.evaluate(&event, Utc::now());
        assert_eq!(engine.window_count(), 1);

        engine.replace_rules(vec![rule("burst", conditions)]).unwrap();
        assert_eq!(engine.window_count(), 0);
    }

    #[test]
    fn to_alert_references_triggering_event() {
        let fired = RuleFired {
            rule_id: "ssh".to_owned(),
            rule_name: "SSH Rule".to_owned(),
            severity: "high".to_owned(),
            description: "desc".to_owned(),
            count: Some(3),
        };
        let mut event = event_from("10.0.0.1", None, "msg");
        event.id = 42;

        let alert = fired.to_alert(&event);
        assert_eq!(alert.event_id, Some(42));
        assert_eq!(alert.source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(alert.rule_id, "ssh");
    }
}

//! 로그 파서 — 우선순위 기반 형식 분류 및 정규화
//!
//! 명명된 형식 패턴의 순서 있는 목록을 유지하며, 고정된 우선순위로
//! 패턴을 시도하여 **처음** 매칭되는 패턴이 선택됩니다. 이 순서는
//! best-match 선택이 아니라 의도된 우선순위 규칙이므로, 패턴은 구체적인
//! 형식부터 느슨한 형식 순으로 정의되어 있고 테스트로 고정됩니다.
//!
//! 어떤 패턴에도 매칭되지 않으면 에러가 아니라 `pattern == "unmatched"`
//! 이벤트로 degrade합니다. 파서는 절대 파이프라인을 중단시키지 않습니다.

use chrono::Utc;
use regex::Regex;

use palisade_core::types::{NormalizedEvent, RawMessage, severity_name};

use crate::error::SiemError;

/// 명명된 형식 패턴
struct FormatPattern {
    /// 형식 이름 (NormalizedEvent.pattern에 기록)
    name: &'static str,
    /// 컴파일된 정규식 (명명 캡처 그룹으로 필드 추출)
    regex: Regex,
}

/// 형식 분류 파서
///
/// 형식 우선순위 (고정):
/// 1. `standard` -- 대괄호 process\[pid\] 형식
/// 2. `rfc3164`  -- 태그 기반 legacy 형식
/// 3. `rfc5424`  -- 구조화 형식 (version/app-name/procid/msgid/sd)
pub struct EventParser {
    formats: Vec<FormatPattern>,
}

impl EventParser {
    /// 기본 형식 목록으로 파서를 생성합니다.
    pub fn new() -> Result<Self, SiemError> {
        let formats = vec![
            FormatPattern {
                name: "standard",
                regex: Regex::new(
                    r"^<(?P<priority>\d+)>(?P<timestamp>[A-Za-z]{3}\s+\d+\s+\d{2}:\d{2}:\d{2})\s+(?P<hostname>\S+)\s+(?P<process>[^\[]+)\[(?P<pid>\d+)\]:\s(?P<message>.+)$",
                )?,
            },
            FormatPattern {
                name: "rfc3164",
                regex: Regex::new(
                    r"^<(?P<priority>\d+)>(?P<timestamp>\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<hostname>\S+)\s+(?P<tag>[^:\s]+):\s*(?P<message>.*)$",
                )?,
            },
            FormatPattern {
                name: "rfc5424",
                regex: Regex::new(
                    r"^<(?P<priority>\d+)>(?P<version>\d+)\s+(?P<timestamp>\S+)\s+(?P<hostname>\S+)\s+(?P<appname>\S+)\s+(?P<procid>\S+)\s+(?P<msgid>\S+)\s+(?P<structured_data>\S+)\s*(?P<message>.*)$",
                )?,
            },
        ];

        Ok(Self { formats })
    }

    /// 등록된 형식 이름을 우선순위 순서로 반환합니다.
    pub fn format_names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name).collect()
    }

    /// 원시 메시지를 정규화된 이벤트로 변환합니다.
    ///
    /// 매칭 실패는 에러가 아니며 `unmatched` 이벤트를 반환합니다.
    pub fn parse(&self, raw: &RawMessage) -> NormalizedEvent {
        let parsed_at = Utc::now();

        for format in &self.formats {
            let Some(caps) = format.regex.captures(&raw.line) else {
                continue;
            };

            let capture = |name: &str| caps.name(name).map(|m| m.as_str().to_owned());

            let priority = capture("priority").and_then(|p| p.parse::<u16>().ok());
            let facility = priority.map(|p| p >> 3);
            let severity = priority.map(|p| (p & 0x07) as u8);

            let event = NormalizedEvent {
                raw: raw.line.clone(),
                pattern: format.name.to_owned(),
                priority,
                facility,
                severity,
                severity_name: severity.map(|s| severity_name(s).to_owned()),
                timestamp: capture("timestamp"),
                hostname: capture("hostname"),
                // rfc3164의 tag는 process로 취급
                process: capture("process").or_else(|| capture("tag")),
                // rfc5424의 procid는 pid로 취급
                pid: capture("pid").or_else(|| capture("procid")),
                app_name: capture("appname"),
                message: capture("message").unwrap_or_default(),
                source_ip: raw.source_ip,
                source_port: raw.source_port,
                received_at: raw.received_at,
                parsed_at,
            };

            metrics::counter!("palisade_parser_matched_total", "pattern" => format.name)
                .increment(1);
            tracing::debug!(pattern = format.name, source_ip = %raw.source_ip, "parsed message");
            return event;
        }

        metrics::counter!("palisade_parser_unmatched_total").increment(1);
        tracing::debug!(source_ip = %raw.source_ip, "no format matched, emitting unmatched event");
        NormalizedEvent::unmatched(raw, parsed_at)
    }
}

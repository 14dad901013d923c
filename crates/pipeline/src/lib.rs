#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`collector`]: UDP syslog 수신 및 줄 단위 프레이밍
//! - [`parser`]: 우선순위 기반 형식 분류 및 정규화
//! - [`indexer`]: 배치 단위 트랜잭션 저장 및 룰 엔진으로의 팬아웃
//! - [`storage`]: SQLite 이벤트/알림 저장소 및 조회 인터페이스
//! - [`rule`]: YAML 룰 로딩 및 슬라이딩 윈도우 threshold 평가
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! UDP 514 -> Collector -> mpsc -> Parser -> mpsc -> Indexer -> mpsc -> RuleEngine
//!               |                    |                 |                   |
//!           줄 분리/lossy        형식 분류         배치 커밋 + ID      윈도우 평가
//!                                                      |                   |
//!                                                  events 테이블       alerts 테이블
//! ```

pub mod collector;
pub mod error;
pub mod indexer;
pub mod parser;
pub mod pipeline;
pub mod rule;
pub mod storage;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{SiemPipeline, SiemPipelineBuilder};

// 에러
pub use error::SiemError;

// 수집기
pub use collector::{UdpCollector, UdpCollectorConfig};

// 파서
pub use parser::EventParser;

// 인덱서
pub use indexer::Indexer;

// 저장소
pub use storage::{AlertFilter, EventFilter, EventStore, StoreStats};

// 룰 엔진
pub use rule::{Rule, RuleEngine, RuleFired};

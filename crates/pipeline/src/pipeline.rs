//! 파이프라인 오케스트레이션 -- 수집/파싱/인덱싱/룰 평가의 전체 흐름을 관리합니다.
//!
//! [`SiemPipeline`]은 core의 [`Pipeline`](palisade_core::pipeline::Pipeline) trait을
//! 구현하여 `palisade-daemon`에서 생명주기(start/stop/health_check)로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! UdpCollector -> mpsc -> parser task -> mpsc -> Indexer -> mpsc -> rule task
//! ```
//!
//! 단계마다 하나의 장기 실행 태스크가 스폰되며, 모든 태스크는 하나의
//! [`CancellationToken`]을 관찰하여 협조적으로 종료됩니다. 종료는 단계
//! 단위이며 작업 중간(배치 커밋 등)을 중단하지 않습니다. 하류 단계가
//! 먼저 멈추면 채널에 메시지가 남을 수 있는데, 이는 재시작 시 백로그
//! 손실로 허용되는 동작입니다.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use palisade_core::config::PalisadeConfig;
use palisade_core::error::{PalisadeError, PipelineError};
use palisade_core::pipeline::{HealthStatus, Pipeline};

use crate::collector::{UdpCollector, UdpCollectorConfig};
use crate::error::SiemError;
use crate::indexer::Indexer;
use crate::parser::EventParser;
use crate::rule::RuleEngine;
use crate::storage::EventStore;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// SIEM 파이프라인 -- 수집/파싱/인덱싱/룰 평가의 전체 흐름을 관리합니다.
///
/// # 사용 예시
/// ```ignore
/// use palisade_pipeline::SiemPipelineBuilder;
///
/// let mut pipeline = SiemPipelineBuilder::new().config(config).build()?;
/// pipeline.start().await?;
/// ```
pub struct SiemPipeline {
    /// 파이프라인 설정
    config: PalisadeConfig,
    /// 현재 상태
    state: PipelineState,
    /// 협조적 종료 토큰
    cancel: CancellationToken,
    /// 백그라운드 태스크 핸들
    tasks: Vec<tokio::task::JoinHandle<()>>,
    /// 로드된 룰 수
    rule_count: usize,
    /// 수집기가 실제 바인드한 주소 (실행 중일 때만)
    local_addr: Option<std::net::SocketAddr>,
}

impl SiemPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 로드된 룰 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// 수집기가 바인드한 실제 주소를 반환합니다.
    ///
    /// 포트 0으로 설정한 경우 OS가 할당한 포트를 확인할 때 사용합니다.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.local_addr
    }
}

impl Pipeline for SiemPipeline {
    async fn start(&mut self) -> Result<(), PalisadeError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!("starting siem pipeline");
        self.cancel = CancellationToken::new();

        // 1. 룰 로드 (파일 단위 복구, 디렉토리 읽기 실패는 치명적)
        let mut rule_engine = RuleEngine::new();
        let rule_count = rule_engine
            .load_from_dir(&self.config.rules.rules_dir)
            .await
            .map_err(PalisadeError::from)?;
        self.rule_count = rule_count;
        tracing::info!(rules = rule_count, "loaded detection rules");

        // 2. 저장소 연결 (쓰기 경로마다 자기 커넥션을 소유)
        let indexer_store =
            EventStore::open(&self.config.indexer.db_path).map_err(PalisadeError::from)?;
        let alert_store =
            EventStore::open(&self.config.indexer.db_path).map_err(PalisadeError::from)?;

        // 3. 단계 간 채널
        let capacity = self.config.collector.channel_capacity;
        let (raw_tx, mut raw_rx) = mpsc::channel(capacity);
        let (normalized_tx, normalized_rx) = mpsc::channel(capacity);
        let (persisted_tx, mut persisted_rx) = mpsc::channel(capacity);

        // 4. 수집기 (바인드 실패는 치명적)
        let collector = UdpCollector::bind(
            UdpCollectorConfig {
                bind_addr: self.config.collector.bind_addr.clone(),
                recv_buffer_size: self.config.collector.recv_buffer_size,
            },
            raw_tx,
            self.cancel.clone(),
        )
        .await
        .map_err(PalisadeError::from)?;
        self.local_addr = collector.local_addr().ok();
        self.tasks.push(tokio::spawn(collector.run()));

        // 5. 파서 태스크
        let parser = EventParser::new().map_err(PalisadeError::from)?;
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe = raw_rx.recv() => match maybe {
                        Some(raw) => {
                            let event = parser.parse(&raw);
                            if normalized_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
            tracing::info!("parser task stopped");
        }));

        // 6. 인덱서 태스크
        let indexer = Indexer::new(
            indexer_store,
            normalized_rx,
            persisted_tx,
            self.config.indexer.batch_size,
            Duration::from_secs(self.config.indexer.flush_interval_secs),
            self.cancel.clone(),
        );
        self.tasks.push(tokio::spawn(indexer.run()));

        // 7. 룰 평가 태스크
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe = persisted_rx.recv() => match maybe {
                        Some(event) => {
                            for fired in rule_engine.evaluate(&event, Utc::now()) {
                                tracing::warn!(
                                    rule = fired.rule_name.as_str(),
                                    source_ip = %event.event.source_ip,
                                    count = fired.count,
                                    "alert fired"
                                );
                                // 알림 쓰기 실패는 다음 이벤트 평가를 막지 않음
                                if let Err(e) = alert_store.save_alert(&fired.to_alert(&event)) {
                                    metrics::counter!("palisade_alert_write_failures_total")
                                        .increment(1);
                                    tracing::error!(
                                        error = %e,
                                        rule = fired.rule_id.as_str(),
                                        "failed to save alert"
                                    );
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
            tracing::info!("rule engine task stopped");
        }));

        self.state = PipelineState::Running;
        tracing::info!("siem pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PalisadeError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping siem pipeline");
        self.cancel.cancel();

        // 각 단계가 자기 플러시 정책대로 마무리할 때까지 대기
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "pipeline task join failed");
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!("siem pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let exited = self.tasks.iter().filter(|t| t.is_finished()).count();
                if exited > 0 {
                    HealthStatus::Degraded(format!("{exited} pipeline task(s) exited early"))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// SIEM 파이프라인 빌더
pub struct SiemPipelineBuilder {
    config: PalisadeConfig,
}

impl SiemPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PalisadeConfig::default(),
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PalisadeConfig) -> Self {
        self.config = config;
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<SiemPipeline, SiemError> {
        self.config.validate().map_err(|e| SiemError::Config {
            field: "config".to_owned(),
            reason: e.to_string(),
        })?;

        Ok(SiemPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            rule_count: 0,
            local_addr: None,
        })
    }
}

impl Default for SiemPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

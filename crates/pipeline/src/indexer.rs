//! 인덱서 — 배치 단위 영속화 및 룰 엔진 팬아웃
//!
//! 입력 채널에서 정규화 이벤트를 배치로 모아, 배치가 가득 차거나
//! 유휴 폴 간격이 지나면 하나의 트랜잭션으로 커밋합니다. 이 두 조건이
//! 부하 시 처리량 지연과 유휴 시 꼬리 지연을 동시에 제한합니다.
//!
//! 커밋 실패 시 배치 전체가 롤백되고 폐기됩니다 (재시도 없음).
//! 독성 배치를 반복 재시도하면 파이프라인이 멈추므로, 개별 레코드
//! 내구성보다 전진을 우선합니다.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use palisade_core::types::{NormalizedEvent, PersistedEvent};

use crate::storage::EventStore;

/// 배치 인덱서
///
/// 커밋 성공 시 각 이벤트에 부여된 식별자를 붙여 커밋 순서 그대로
/// 룰 엔진 채널로 팬아웃합니다.
pub struct Indexer {
    store: EventStore,
    rx: mpsc::Receiver<NormalizedEvent>,
    tx: mpsc::Sender<PersistedEvent>,
    batch_size: usize,
    flush_interval: Duration,
    cancel: CancellationToken,
}

impl Indexer {
    /// 새 인덱서를 생성합니다.
    pub fn new(
        store: EventStore,
        rx: mpsc::Receiver<NormalizedEvent>,
        tx: mpsc::Sender<PersistedEvent>,
        batch_size: usize,
        flush_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            rx,
            tx,
            batch_size,
            flush_interval,
            cancel,
        }
    }

    /// 인덱싱 루프를 실행합니다.
    ///
    /// 취소 시 또는 상류 채널이 닫히면 남은 부분 배치를 플러시하고 종료합니다.
    pub async fn run(mut self) {
        tracing::info!(
            batch_size = self.batch_size,
            flush_interval_secs = self.flush_interval.as_secs(),
            "indexer started"
        );
        let mut batch: Vec<NormalizedEvent> = Vec::with_capacity(self.batch_size);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("indexer stopping, flushing partial batch");
                    break;
                }
                received = timeout(self.flush_interval, self.rx.recv()) => {
                    match received {
                        Ok(Some(event)) => {
                            batch.push(event);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        Ok(None) => {
                            tracing::info!("event channel closed, flushing partial batch");
                            break;
                        }
                        // 유휴 타임아웃: 모인 만큼 플러시
                        Err(_) => self.flush(&mut batch).await,
                    }
                }
            }
        }

        self.flush(&mut batch).await;
    }

    /// 배치를 하나의 트랜잭션으로 커밋하고 팬아웃합니다.
    ///
    /// 빈 배치는 no-op입니다 (트랜잭션도 열지 않음).
    /// 실패 시 배치는 폐기되며 루프는 계속됩니다.
    pub async fn flush(&mut self, batch: &mut Vec<NormalizedEvent>) {
        if batch.is_empty() {
            return;
        }

        let events: Vec<NormalizedEvent> = batch.drain(..).collect();

        match self.store.insert_batch(&events) {
            Ok(ids) => {
                metrics::counter!("palisade_indexer_persisted_total").increment(ids.len() as u64);
                tracing::debug!(count = ids.len(), "committed event batch");

                // 커밋 순서 그대로 팬아웃
                for (id, event) in ids.into_iter().zip(events) {
                    let persisted = PersistedEvent { id, event };
                    if self.tx.send(persisted).await.is_err() {
                        tracing::warn!("persisted event channel closed, dropping fanout");
                        return;
                    }
                }
            }
            Err(e) => {
                metrics::counter!("palisade_indexer_persist_failures_total").increment(1);
                tracing::error!(
                    error = %e,
                    dropped = events.len(),
                    "batch commit failed, dropping batch"
                );
            }
        }
    }
}

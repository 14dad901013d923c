//! 파이프라인 trait — 모듈 생명주기 정의
//!
//! 데몬이 모든 모듈을 동일한 인터페이스(start/stop/health_check)로
//! 관리할 수 있도록 합니다.

use std::future::Future;

use crate::error::PalisadeError;

/// 모듈 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 동작 중이지만 성능 저하 또는 부분 장애
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 모듈 생명주기 trait
///
/// 각 모듈은 이 trait을 구현하여 데몬의 생명주기 관리에 참여합니다.
pub trait Pipeline: Send {
    /// 모듈을 시작합니다. 백그라운드 태스크를 스폰하고 즉시 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), PalisadeError>> + Send;

    /// 모듈을 정지합니다. 협조적 취소 후 태스크 종료를 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), PalisadeError>> + Send;

    /// 모듈의 현재 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

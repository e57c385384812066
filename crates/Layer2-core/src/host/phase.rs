//! Host Phase - 리로드/명령 처리 상호 배제
//!
//! `Starting → Initializing → Running ⇄ Reloading`, 어느 상태에서든 `Stopping`으로 전이합니다.

use kiln_foundation::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// 호스트 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPhase {
    Starting,

    /// 최초 패스 진행 중
    Initializing,
    Running,
    Reloading,
    Stopping,
}

impl std::fmt::Display for HostPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Reloading => write!(f, "reloading"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// 단계 컨트롤러
#[derive(Debug)]
pub struct PhaseController {
    phase: Mutex<HostPhase>,
}

impl PhaseController {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(HostPhase::Starting),
        }
    }

    pub fn current(&self) -> HostPhase {
        *self.phase.lock()
    }

    /// 명령 디스패치 가능 여부
    pub fn accepts_commands(&self) -> bool {
        self.current() == HostPhase::Running
    }

    /// 최초 패스 시작 (`Starting`에서만, 두 번째 호출은 `Error::Busy`)
    pub fn begin_start(&self) -> Result<()> {
        self.transition(HostPhase::Starting, HostPhase::Initializing)
    }

    /// 시작 완료 (`Initializing`에서만)
    pub fn mark_running(&self) -> Result<()> {
        self.transition(HostPhase::Initializing, HostPhase::Running)
    }

    /// 리로드 시작
    ///
    /// `Running`이 아니면 `Error::Busy`. 가드가 drop되면 `Running`으로 돌아갑니다.
    pub fn begin_reload(&self) -> Result<ReloadGuard<'_>> {
        self.transition(HostPhase::Running, HostPhase::Reloading)?;
        Ok(ReloadGuard { controller: self })
    }

    /// 종료 시작 (이전 단계 반환)
    pub fn begin_stop(&self) -> HostPhase {
        let mut phase = self.phase.lock();
        let previous = *phase;
        *phase = HostPhase::Stopping;
        debug!("Host phase: {} -> stopping", previous);
        previous
    }

    fn transition(&self, from: HostPhase, to: HostPhase) -> Result<()> {
        let mut phase = self.phase.lock();
        if *phase != from {
            return Err(Error::Busy(format!(
                "cannot enter {} while host is {}",
                to, *phase
            )));
        }
        *phase = to;
        debug!("Host phase: {} -> {}", from, to);
        Ok(())
    }
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}

/// 리로드 진행 중 표시
pub struct ReloadGuard<'a> {
    controller: &'a PhaseController,
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        let mut phase = self.controller.phase.lock();
        if *phase == HostPhase::Reloading {
            *phase = HostPhase::Running;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_is_exclusive() {
        let phase = PhaseController::new();
        assert!(phase.begin_reload().is_err());
        assert!(!phase.accepts_commands());

        phase.begin_start().unwrap();
        assert!(phase.begin_reload().is_err());
        phase.mark_running().unwrap();
        assert!(phase.accepts_commands());

        {
            let _guard = phase.begin_reload().unwrap();
            assert_eq!(phase.current(), HostPhase::Reloading);
            assert!(!phase.accepts_commands());
            assert!(matches!(phase.begin_reload(), Err(Error::Busy(_))));
        }

        assert_eq!(phase.current(), HostPhase::Running);
    }

    #[test]
    fn test_stop_during_reload_wins() {
        let phase = PhaseController::new();
        phase.begin_start().unwrap();
        phase.mark_running().unwrap();

        let guard = phase.begin_reload().unwrap();
        assert_eq!(phase.begin_stop(), HostPhase::Reloading);
        drop(guard);

        assert_eq!(phase.current(), HostPhase::Stopping);
        assert!(phase.mark_running().is_err());
    }

    #[test]
    fn test_start_only_once() {
        let phase = PhaseController::new();
        phase.begin_start().unwrap();
        assert_eq!(phase.current(), HostPhase::Initializing);
        assert!(matches!(phase.begin_start(), Err(Error::Busy(_))));
        assert!(!phase.accepts_commands());

        phase.mark_running().unwrap();
        assert!(phase.begin_start().is_err());
        assert!(phase.mark_running().is_err());
    }
}

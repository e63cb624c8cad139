//! Step lifecycle state

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// 스텝 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StepState {
    Created = 1,
    Initialized = 2,
    Running = 3,
    Finished = 4,
    Stopped = 5,
    Failed = 6,
    Disposed = 7,
}

impl StepState {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(StepState::Created),
            2 => Some(StepState::Initialized),
            3 => Some(StepState::Running),
            4 => Some(StepState::Finished),
            5 => Some(StepState::Stopped),
            6 => Some(StepState::Failed),
            7 => Some(StepState::Disposed),
            _ => None,
        }
    }

    /// FINISHED / STOPPED / FAILED
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            StepState::Finished | StepState::Stopped | StepState::Failed
        )
    }
}

/// Shared, lock-free view of a step copy's lifecycle.
///
/// The step thread writes it; the orchestrator and monitoring read it.
/// `outcome` survives the final transition to DISPOSED.
#[derive(Debug)]
pub struct StepStatus {
    state: AtomicU8,
    outcome: AtomicU8,
    started: Mutex<Option<Instant>>,
    elapsed: Mutex<Option<Duration>>,
}

impl StepStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(StepState::Created as u8),
            outcome: AtomicU8::new(0),
            started: Mutex::new(None),
            elapsed: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StepState {
        StepState::from_u8(self.state.load(Ordering::SeqCst)).unwrap_or(StepState::Created)
    }

    pub fn outcome(&self) -> Option<StepState> {
        StepState::from_u8(self.outcome.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: StepState) {
        match state {
            StepState::Running => *self.started.lock() = Some(Instant::now()),
            s if s.is_outcome() => {
                self.outcome.store(s as u8, Ordering::SeqCst);
                let started = *self.started.lock();
                *self.elapsed.lock() = started.map(|t| t.elapsed());
            }
            _ => {}
        }
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// DISPOSED까지 도달했는지
    pub fn is_disposed(&self) -> bool {
        self.state() == StepState::Disposed
    }

    /// 실행 시간 (실행 중이면 현재까지)
    pub fn duration(&self) -> Duration {
        if let Some(elapsed) = *self.elapsed.lock() {
            return elapsed;
        }
        let started = *self.started.lock();
        started.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::new()
    }
}

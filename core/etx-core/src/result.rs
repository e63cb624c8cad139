//! Result — step 및 run 단위 행 카운터
//!
//! 스텝 스레드가 [`StepCounters`]를 갱신하고, 오케스트레이터는 실행 중에도
//! 스냅샷([`StepResult`])을 읽을 수 있다. run 종료 시 모든 스텝 결과를
//! [`RunResult`]로 집계한다.

use crate::step::StepState;
use crate::trans::StopReason;
use serde::Serialize;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 행 카운터 묶음
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// 입력 row set에서 읽은 행
    pub read: u64,
    /// 출력 row set으로 보낸 행 (fan-out 복제는 한 번만 센다)
    pub written: u64,
    /// 외부 소스에서 읽은 행 (파일, 테이블 등)
    pub input: u64,
    /// 외부 대상에 쓴 행
    pub output: u64,
    pub updated: u64,
    pub inserted: u64,
    pub deleted: u64,
    /// 에러 hop으로 보낸 행
    pub rejected: u64,
    pub errors: u64,
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.read += rhs.read;
        self.written += rhs.written;
        self.input += rhs.input;
        self.output += rhs.output;
        self.updated += rhs.updated;
        self.inserted += rhs.inserted;
        self.deleted += rhs.deleted;
        self.rejected += rhs.rejected;
        self.errors += rhs.errors;
    }
}

/// Live counters of one step copy.
#[derive(Debug, Default)]
pub struct StepCounters {
    read: AtomicU64,
    written: AtomicU64,
    input: AtomicU64,
    output: AtomicU64,
    updated: AtomicU64,
    inserted: AtomicU64,
    deleted: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
}

macro_rules! counter {
    ($get:ident, $inc:ident) => {
        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }

        pub fn $inc(&self, n: u64) -> u64 {
            self.$get.fetch_add(n, Ordering::Relaxed) + n
        }
    };
}

impl StepCounters {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(read, add_read);
    counter!(written, add_written);
    counter!(input, add_input);
    counter!(output, add_output);
    counter!(updated, add_updated);
    counter!(inserted, add_inserted);
    counter!(deleted, add_deleted);
    counter!(rejected, add_rejected);
    counter!(errors, add_errors);

    pub fn snapshot(&self) -> Counts {
        Counts {
            read: self.read(),
            written: self.written(),
            input: self.input(),
            output: self.output(),
            updated: self.updated(),
            inserted: self.inserted(),
            deleted: self.deleted(),
            rejected: self.rejected(),
            errors: self.errors(),
        }
    }
}

/// Snapshot of one step copy.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: String,
    pub copy: usize,
    pub state: StepState,
    /// 종료 상태 (FINISHED / STOPPED / FAILED), 아직 실행 중이면 None
    pub outcome: Option<StepState>,
    #[serde(flatten)]
    pub counts: Counts,
    pub duration: Duration,
}

impl StepResult {
    /// Kettle 스타일 요약: `I=0, O=0, R=3, W=3, U=0, E=0`
    pub fn summary(&self) -> String {
        format!(
            "I={}, O={}, R={}, W={}, U={}, E={}",
            self.counts.input,
            self.counts.output,
            self.counts.read,
            self.counts.written,
            self.counts.updated,
            self.counts.errors
        )
    }
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 에러 0, 모든 스텝 정상 종료
    Success,
    /// 에러가 있었지만 치명적 중단은 없음
    CompletedWithErrors,
    /// 외부 요청이나 행 제한으로 중단 (에러 수는 `errors`에)
    Stopped,
    /// 치명적 실패 또는 에러 제한 초과
    Failed,
}

/// Aggregated result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    /// 공유 에러 카운터 (모든 스텝 합)
    pub errors: u64,
    /// 모든 step copy의 카운터 합
    pub totals: Counts,
    pub stop_reason: Option<StopReason>,
    pub steps: Vec<StepResult>,
    pub duration: Duration,
}

impl RunResult {
    /// 에러 카운트가 0일 때만 성공
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// 특정 step copy의 결과
    pub fn step(&self, name: &str, copy: usize) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == name && s.copy == copy)
    }

    /// 한 스텝의 모든 copy 카운터 합
    pub fn step_totals(&self, name: &str) -> Counts {
        let mut counts = Counts::default();
        for s in self.steps.iter().filter(|s| s.step == name) {
            counts += s.counts;
        }
        counts
    }

    pub(crate) fn classify(
        errors: u64,
        stop_reason: Option<&StopReason>,
        steps: &[StepResult],
    ) -> RunStatus {
        let any_failed = steps.iter().any(|s| s.outcome == Some(StepState::Failed));
        match stop_reason {
            _ if any_failed => RunStatus::Failed,
            Some(StopReason::StepFailed { .. }) | Some(StopReason::ErrorLimit) => {
                RunStatus::Failed
            }
            Some(StopReason::External) | Some(StopReason::RowLimit) => RunStatus::Stopped,
            _ if errors > 0 => RunStatus::CompletedWithErrors,
            _ => RunStatus::Success,
        }
    }
}

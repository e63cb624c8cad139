//! Step — 하나의 operator 인스턴스 (step 정의 + copy 번호)
//!
//! - [`StepPlugin`] — 플러그인이 구현하는 init / process_row / dispose 계약
//! - [`StepContext`] — 입력/출력 row set, 카운터, 공유 중단 플래그에 대한 접근
//! - [`StepState`] — `CREATED → INITIALIZED → RUNNING → {FINISHED|STOPPED|FAILED} → DISPOSED`

mod context;
mod plugin;
pub(crate) mod runner;
mod state;

pub use context::{ERROR_FIELDS, OutputGroup, StepContext};
pub use plugin::{Capabilities, Canceller, StepMeta, StepPlugin};
pub use state::{StepState, StepStatus};

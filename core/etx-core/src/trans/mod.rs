//! Trans — 그래프 정의, 배선, 실행 제어
//!
//! - [`TransDefinition`] — 스텝 + hop 목록 (JSON 직렬화)
//! - [`TransConfig`] — 엔진 설정 (`ETX_*` 환경 변수)
//! - [`TransControl`] — run 범위의 중단 플래그와 에러 카운터
//! - [`Trans`] — 오케스트레이터

mod config;
mod control;
mod engine;
mod topology;

pub use config::{HopDefinition, HopKind, StepDefinition, TransConfig, TransDefinition};
pub use control::{StopReason, TransControl};
pub use engine::Trans;

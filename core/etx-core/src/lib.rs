//! # ETX — Step/Hop ETL Execution Engine
//!
//! ETX는 스텝(operator)과 hop(데이터 흐름 간선)으로 구성된 그래프를 실행하는
//! 엔진입니다. 스텝 copy마다 전용 스레드 하나를 두고, 스텝 사이는 용량이 제한된
//! row set으로만 통신합니다.
//!
//! ## 주요 특징
//!
//! - **Bounded row sets**: 용량 기반 backpressure, 종료 표시, 소비자 분리
//! - **Thread-per-step**: `CREATED → INITIALIZED → RUNNING → {FINISHED|STOPPED|FAILED} → DISPOSED`
//! - **공유 중단 플래그**: 치명적 실패, 외부 중단, 에러/행 제한 시 전체 종료
//! - **에러 hop**: 행 단위 실패를 진단 필드와 함께 별도 row set으로 전달
//! - **배치 commit**: 트랜잭션 자원을 감싸는 스텝의 N행 단위 commit
//!
//! ## 빠른 시작
//!
//! ```rust
//! use etx_core::{HopDefinition, RunStatus, StepDefinition, StepRegistry, Trans, TransConfig, TransDefinition};
//!
//! # fn main() -> etx_core::EtxResult<()> {
//! let def = TransDefinition::new("quick start")
//!     .step(StepDefinition::new("numbers", "Sequence").with_param("count", "3"))
//!     .step(StepDefinition::new("pass", "Dummy"))
//!     .hop(HopDefinition::new("numbers", "pass"));
//!
//! let trans = Trans::new(&def, &StepRegistry::with_builtins(), TransConfig::default())?;
//! let result = trans.run()?;
//!
//! assert_eq!(result.status, RunStatus::Success);
//! assert_eq!(result.step_totals("pass").read, 3);
//! # Ok(())
//! # }
//! ```
//!
//! ### 사용자 정의 스텝
//!
//! ```rust
//! use etx_core::{EtxResult, StepContext, StepPlugin, StepRegistry};
//!
//! struct Upper;
//!
//! impl StepPlugin for Upper {
//!     fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
//!         let Some(row) = ctx.get_row()? else {
//!             return Ok(false);
//!         };
//!         ctx.put_row(row)?;
//!         Ok(true)
//!     }
//! }
//!
//! let registry = StepRegistry::with_builtins();
//! registry.register("Upper", |_| Ok(Box::new(Upper) as Box<dyn StepPlugin>)).unwrap();
//! ```
//!
//! ## 실행 흐름
//!
//! ```text
//! TransDefinition → 검증 / 미사용 입력 제거 → row set 배선 → 플러그인 생성 (CREATED)
//!     → prepare_execution (병렬 init) → start_threads → wait_until_finished → RunResult
//! ```
//!
//! ## 모듈 구조
//!
//! - [`row`] — Row, RowSchema, Value
//! - [`rowset`] — 스텝 사이의 bounded FIFO
//! - [`step`] — 플러그인 계약, 스텝 컨텍스트, 상태 기계
//! - [`trans`] — 그래프 정의, 배선, 오케스트레이터
//! - [`result`] — 스텝/run 카운터
//! - [`resource`] — 트랜잭션 자원 계약과 배치 commit
//! - [`registry`] — 플러그인 키 → 생성자
//! - [`steps`] — 내장 스텝

pub mod error;
pub mod registry;
pub mod resource;
pub mod result;
pub mod row;
pub mod rowset;
pub mod step;
pub mod steps;
pub mod trans;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use error::{ErrorDiagnostic, EtxError, EtxResult};
pub use registry::StepRegistry;
pub use resource::{CommitPolicy, StatementOutcome, TransactionalResource};
pub use result::{Counts, RunResult, RunStatus, StepResult};
pub use row::{Row, RowSchema, Value, ValueMeta, ValueType};
pub use rowset::RowSet;
pub use step::{Capabilities, Canceller, StepContext, StepMeta, StepPlugin, StepState};
pub use trans::{
    HopDefinition, HopKind, StepDefinition, StopReason, Trans, TransConfig, TransControl,
    TransDefinition,
};

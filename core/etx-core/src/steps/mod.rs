//! Built-in steps
//!
//! - [`Dummy`] — 입력 행을 그대로 전달
//! - [`Sequence`] — 정수 시퀀스 소스
//! - [`RowGenerator`] — 고정된 행 목록 소스
//! - [`FilterRows`] — 조건에 맞는 행만 전달
//! - [`RowCollector`] — 받은 행을 공유 버퍼에 저장
//! - [`ExecStatement`] — 행마다 문장을 실행하는 트랜잭션 스텝

mod collector;
mod dummy;
mod exec_statement;
mod filter;
mod generator;
mod sequence;

pub use collector::RowCollector;
pub use dummy::Dummy;
pub use exec_statement::ExecStatement;
pub use filter::FilterRows;
pub use generator::RowGenerator;
pub use sequence::Sequence;

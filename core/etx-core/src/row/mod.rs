//! Row & RowSchema — 엔진을 흐르는 데이터 단위
//!
//! - [`Value`] — 필드 값 (타입별 variant를 가진 닫힌 tagged union)
//! - [`RowSchema`] — 필드 기술자 목록 (이름, 타입, 길이/정밀도 힌트)
//! - [`Row`] — 스키마에 맞는 값 목록, row set에 올라간 뒤에는 불변

mod data;
mod schema;
mod value;

pub use data::Row;
pub use schema::{RowSchema, ValueMeta};
pub use value::{Value, ValueType};

//! Sequence — `count`개의 정수 행을 내보내는 소스

use crate::error::{EtxError, EtxResult};
use crate::row::{Row, RowSchema, Value, ValueMeta, ValueType};
use crate::step::{StepContext, StepMeta, StepPlugin};
use std::sync::Arc;

/// Source emitting `count` rows `{field: start}`, `{field: start + 1}`, ...
///
/// | param   | default |
/// |---------|---------|
/// | `count` | required |
/// | `start` | 1       |
/// | `field` | `id`    |
#[derive(Debug, Clone)]
pub struct Sequence {
    schema: Arc<RowSchema>,
    next: i64,
    remaining: u64,
}

impl Sequence {
    pub const KEY: &'static str = "Sequence";

    pub fn new(field: impl Into<String>, start: i64, count: u64) -> EtxResult<Self> {
        if count > 0 && start.checked_add_unsigned(count - 1).is_none() {
            return Err(EtxError::Config(format!(
                "sequence of {count} rows starting at {start} overflows i64"
            )));
        }
        let schema = RowSchema::new(vec![ValueMeta::new(field, ValueType::Integer)])?;
        Ok(Self {
            schema: Arc::new(schema),
            next: start,
            remaining: count,
        })
    }

    pub fn from_meta(meta: &StepMeta) -> EtxResult<Self> {
        meta.required_param("count")?;
        let count = meta.parse_param::<u64>("count")?.unwrap_or_default();
        let start = meta.parse_param::<i64>("start")?.unwrap_or(1);
        let field = meta.param("field").unwrap_or("id");
        Self::new(field, start, count)
    }
}

impl StepPlugin for Sequence {
    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        let row = Row::new(Arc::clone(&self.schema), vec![Value::Integer(self.next)])?;
        ctx.put_row(row)?;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.next = self
                .next
                .checked_add(1)
                .ok_or_else(|| EtxError::Config("sequence overflows i64".to_string()))?;
        }
        Ok(true)
    }
}

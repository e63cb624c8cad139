use crate::error::EtxResult;
use crate::row::{Row, RowSchema, Value};
use crate::step::{StepContext, StepPlugin};
use std::collections::VecDeque;
use std::sync::Arc;

/// Source emitting a fixed list of rows, in order.
///
/// Clone it into a registry constructor to get one instance per step copy;
/// every copy emits the full list.
#[derive(Debug, Clone, Default)]
pub struct RowGenerator {
    rows: VecDeque<Row>,
}

impl RowGenerator {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    /// 값 목록에서 생성. 각 행은 스키마에 맞아야 한다.
    pub fn from_values(schema: Arc<RowSchema>, values: Vec<Vec<Value>>) -> EtxResult<Self> {
        let rows = values
            .into_iter()
            .map(|v| Row::new(Arc::clone(&schema), v))
            .collect::<EtxResult<Vec<_>>>()?;
        Ok(Self::new(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl StepPlugin for RowGenerator {
    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
        match self.rows.pop_front() {
            Some(row) => {
                ctx.put_row(row)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

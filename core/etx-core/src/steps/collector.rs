use crate::error::EtxResult;
use crate::row::Row;
use crate::step::{StepContext, StepPlugin};
use parking_lot::Mutex;
use std::sync::Arc;

/// Sink storing every received row in a shared buffer.
///
/// Clones share the buffer, so one collector can back all copies of a step
/// and still be read after the run.
#[derive(Debug, Clone, Default)]
pub struct RowCollector {
    rows: Arc<Mutex<Vec<Row>>>,
}

impl RowCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 받은 행 (도착 순서)
    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl StepPlugin for RowCollector {
    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
        let Some(row) = ctx.get_row()? else {
            return Ok(false);
        };
        self.rows.lock().push(row.clone());
        // 다음 hop이 있으면 그대로 전달
        ctx.put_row(row)?;
        Ok(true)
    }
}

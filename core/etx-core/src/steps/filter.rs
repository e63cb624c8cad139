use crate::error::EtxResult;
use crate::row::{Row, Value};
use crate::step::{StepContext, StepPlugin};
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&Row) -> EtxResult<bool> + Send + Sync;

/// Forwards rows matching a predicate and drops the rest.
///
/// Dropped rows are `read - written` in the step's counters.
#[derive(Clone)]
pub struct FilterRows {
    predicate: Arc<Predicate>,
}

impl FilterRows {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Row) -> EtxResult<bool> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// 필드 값에 대한 조건. 필드가 없으면 치명적 에러
    pub fn field<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        Self::new(move |row| Ok(test(row.get_by_name(&name)?)))
    }
}

impl fmt::Debug for FilterRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRows").finish_non_exhaustive()
    }
}

impl StepPlugin for FilterRows {
    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
        let Some(row) = ctx.get_row()? else {
            return Ok(false);
        };
        if (self.predicate)(&row)? {
            ctx.put_row(row)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{RowSchema, ValueMeta, ValueType};
    use crate::rowset::RowSet;
    use crate::step::{OutputGroup, StepMeta};
    use crate::trans::TransControl;

    #[test]
    fn test_drops_non_matching() {
        let schema = Arc::new(RowSchema::new(vec![ValueMeta::new("id", ValueType::Integer)]).unwrap());
        let input = Arc::new(RowSet::new("in", 10));
        for i in 1..=6 {
            input.put(Row::new(Arc::clone(&schema), vec![Value::Integer(i)]).unwrap()).unwrap();
        }
        input.close().unwrap();
        let out = Arc::new(RowSet::new("out", 10));

        let mut ctx = StepContext::new(StepMeta::new("even"), Arc::new(TransControl::unlimited()))
            .with_inputs(vec![input])
            .with_outputs(vec![OutputGroup::new("sink", vec![Arc::clone(&out)])]);
        let mut filter = FilterRows::field("id", |v| v.as_i64().is_ok_and(|n| n % 2 == 0));
        while filter.process_row(&mut ctx).unwrap() {}

        assert_eq!(ctx.counters().read(), 6);
        assert_eq!(ctx.counters().written(), 3);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_missing_field_is_error() {
        let schema = Arc::new(RowSchema::new(vec![ValueMeta::new("id", ValueType::Integer)]).unwrap());
        let input = Arc::new(RowSet::new("in", 10));
        input.put(Row::new(schema, vec![Value::Integer(1)]).unwrap()).unwrap();

        let mut ctx = StepContext::new(StepMeta::new("f"), Arc::new(TransControl::unlimited()))
            .with_inputs(vec![input]);
        let mut filter = FilterRows::field("name", |v| !v.is_null());
        assert!(filter.process_row(&mut ctx).is_err());
    }
}

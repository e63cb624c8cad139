//! Row — 스키마에 묶인 값 목록

use super::{RowSchema, Value};
use crate::error::{EtxError, EtxResult};
use std::sync::Arc;

/// 한 행의 데이터
///
/// 생성 시 스키마와 값의 개수/타입을 검증한다. 필드는 비공개이며
/// row set에 올라간 이후에는 수정할 수 없다 (변경이 필요하면 복사본을 만든다).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<RowSchema>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(schema: Arc<RowSchema>, values: Vec<Value>) -> EtxResult<Self> {
        if schema.len() != values.len() {
            return Err(EtxError::Schema(format!(
                "row has {} values but schema has {} fields",
                values.len(),
                schema.len()
            )));
        }
        for (meta, value) in schema.fields().iter().zip(values.iter()) {
            if !value.matches_type(meta.value_type) {
                return Err(EtxError::TypeMismatch {
                    field: meta.name.clone(),
                    expected: meta.value_type.to_string(),
                    actual: value
                        .value_type()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "Null".to_string()),
                });
            }
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> EtxResult<&Value> {
        self.schema
            .index_of(name)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| EtxError::FieldNotFound(name.to_string()))
    }

    /// 값 뒤에 필드를 덧붙인 새 행. `schema`는 확장된 스키마여야 한다.
    pub fn extend(&self, schema: Arc<RowSchema>, extra: Vec<Value>) -> EtxResult<Row> {
        let mut values = Vec::with_capacity(self.values.len() + extra.len());
        values.extend(self.values.iter().cloned());
        values.extend(extra);
        Row::new(schema, values)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

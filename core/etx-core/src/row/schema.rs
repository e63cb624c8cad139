//! Row schema — ordered field descriptors

use super::ValueType;
use crate::error::{EtxError, EtxResult};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// 필드 기술자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMeta {
    pub name: String,
    pub value_type: ValueType,
    /// 길이 힌트 (문자열 길이, 정수 자릿수 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// 정밀도 힌트 (소수점 이하 자릿수)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

impl ValueMeta {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            length: None,
            precision: None,
        }
    }

    pub fn with_length(mut self, length: u32, precision: Option<u32>) -> Self {
        self.length = Some(length);
        self.precision = precision;
        self
    }
}

/// Row schema
///
/// 필드 이름은 스키마 내에서 유일해야 한다.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowSchema {
    fields: Vec<ValueMeta>,
}

impl RowSchema {
    pub fn new(fields: Vec<ValueMeta>) -> EtxResult<Self> {
        let mut seen = AHashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(EtxError::Schema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[ValueMeta] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&ValueMeta> {
        self.fields.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// 필드 개수와 위치별 타입이 같으면 호환 (이름은 비교하지 않음)
    pub fn is_compatible(&self, other: &RowSchema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.value_type == b.value_type)
    }

    /// Describes the first positional difference, if any.
    pub fn incompatibility(&self, other: &RowSchema) -> Option<String> {
        if self.fields.len() != other.fields.len() {
            return Some(format!(
                "expected {} fields, got {}",
                self.fields.len(),
                other.fields.len()
            ));
        }
        self.fields
            .iter()
            .zip(other.fields.iter())
            .enumerate()
            .find(|(_, (a, b))| a.value_type != b.value_type)
            .map(|(i, (a, b))| {
                format!(
                    "field #{} '{}' is {}, got {} '{}'",
                    i, a.name, a.value_type, b.value_type, b.name
                )
            })
    }

    /// 필드를 뒤에 덧붙인 새 스키마
    pub fn extended(&self, extra: impl IntoIterator<Item = ValueMeta>) -> EtxResult<RowSchema> {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        RowSchema::new(fields)
    }
}

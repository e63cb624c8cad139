//! Field values

use crate::error::{EtxError, EtxResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 필드의 의미상 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Number,
    Date,
    Binary,
    Boolean,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "String",
            ValueType::Integer => "Integer",
            ValueType::Number => "Number",
            ValueType::Date => "Date",
            ValueType::Binary => "Binary",
            ValueType::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 값
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    Date(NaiveDateTime),
    Binary(Vec<u8>),
    Boolean(bool),
}

impl Value {
    /// Null이면 None
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(ValueType::String),
            Value::Integer(_) => Some(ValueType::Integer),
            Value::Number(_) => Some(ValueType::Number),
            Value::Date(_) => Some(ValueType::Date),
            Value::Binary(_) => Some(ValueType::Binary),
            Value::Boolean(_) => Some(ValueType::Boolean),
        }
    }

    pub fn matches_type(&self, expected: ValueType) -> bool {
        match self.value_type() {
            None => true, // Null은 모든 타입과 호환
            Some(actual) => actual == expected,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, expected: ValueType) -> EtxError {
        EtxError::TypeMismatch {
            field: String::new(),
            expected: expected.to_string(),
            actual: self
                .value_type()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "Null".to_string()),
        }
    }

    pub fn as_i64(&self) -> EtxResult<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            _ => Err(self.mismatch(ValueType::Integer)),
        }
    }

    pub fn as_f64(&self) -> EtxResult<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Integer(i) => Ok(*i as f64),
            _ => Err(self.mismatch(ValueType::Number)),
        }
    }

    pub fn as_str(&self) -> EtxResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(self.mismatch(ValueType::String)),
        }
    }

    pub fn as_bool(&self) -> EtxResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch(ValueType::Boolean)),
        }
    }

    pub fn as_bytes(&self) -> EtxResult<&[u8]> {
        match self {
            Value::Binary(b) => Ok(b),
            _ => Err(self.mismatch(ValueType::Binary)),
        }
    }

    pub fn as_date(&self) -> EtxResult<NaiveDateTime> {
        match self {
            Value::Date(d) => Ok(*d),
            _ => Err(self.mismatch(ValueType::Date)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<null>"),
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y/%m/%d %H:%M:%S%.3f")),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Boolean(b) => f.write_str(if *b { "Y" } else { "N" }),
        }
    }
}

//! Error types for the ETX execution engine.
//!
//! All public APIs return `EtxResult<T>`; library code does not panic.

use crate::row::Row;
use thiserror::Error;

/// Diagnostic tuple attached to a rejected row.
///
/// 에러 큐로 전달되는 고정 형태의 진단 정보 (메시지, 코드, 필드명).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDiagnostic {
    pub message: String,
    pub code: String,
    pub field: Option<String>,
}

impl ErrorDiagnostic {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Unified error type for all ETX operations.
#[derive(Debug, Error)]
pub enum EtxError {
    /// Invalid transformation definition or engine setting
    #[error("configuration error: {0}")]
    Config(String),

    /// Hop or lookup references a step that does not exist
    #[error("step '{0}' not found")]
    StepNotFound(String),

    /// Two steps share the same name
    #[error("duplicate step '{0}'")]
    DuplicateStep(String),

    /// Plugin key is not registered
    #[error("plugin '{0}' not registered")]
    PluginNotFound(String),

    /// Plugin key registered twice
    #[error("plugin '{0}' already registered")]
    DuplicatePlugin(String),

    /// Enabled hops form a cycle
    #[error("hop cycle detected through step '{0}'")]
    CycleDetected(String),

    /// Schema definition or validation error
    #[error("schema error: {0}")]
    Schema(String),

    /// Value type does not match the field type
    #[error("type mismatch on field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A row set received a row whose layout differs from the first row
    #[error("incompatible row layout on row set '{rowset}': {reason}")]
    IncompatibleSchema { rowset: String, reason: String },

    /// Named field is absent from the row schema
    #[error("field '{0}' not found")]
    FieldNotFound(String),

    /// Terminal marker posted twice, or a put after the marker
    #[error("row set '{0}' is already closed")]
    RowSetClosed(String),

    /// Plugin init hook failed; no rows have flowed
    #[error("step '{step}' failed to initialize: {reason}")]
    InitFailed { step: String, reason: String },

    /// Non-recoverable step failure
    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// Recoverable per-row failure, routed to the error hop when enabled
    #[error("row failed [{}]: {}", .diagnostic.code, .diagnostic.message)]
    RowFailed {
        row: Box<Row>,
        diagnostic: ErrorDiagnostic,
    },

    /// put_error called on a step without an active error hop
    #[error("error handling is not enabled for step '{0}'")]
    ErrorHandlingDisabled(String),

    /// Transactional resource error (execute, commit, rollback)
    #[error("resource error during {operation}: {message}")]
    Resource { operation: String, message: String },

    /// In-flight work was cancelled by stopRunning
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Operation not valid in the current lifecycle state
    #[error("invalid operation: {message}\nContext: {context}")]
    InvalidOperation { message: String, context: String },

    /// Step thread could not be spawned or panicked
    #[error("thread error: {0}")]
    Thread(String),

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for all ETX operations.
pub type EtxResult<T> = Result<T, EtxError>;

impl From<serde_json::Error> for EtxError {
    fn from(err: serde_json::Error) -> Self {
        EtxError::Serialization(err.to_string())
    }
}

impl EtxError {
    /// Shorthand for a recoverable row failure.
    pub fn row_failed(row: Row, diagnostic: ErrorDiagnostic) -> Self {
        EtxError::RowFailed {
            row: Box::new(row),
            diagnostic,
        }
    }

    pub fn resource(operation: impl Into<String>, message: impl Into<String>) -> Self {
        EtxError::Resource {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_row_failure(&self) -> bool {
        matches!(self, EtxError::RowFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{RowSchema, Value, ValueMeta, ValueType};
    use std::sync::Arc;

    #[test]
    fn error_display_step_not_found() {
        let err = EtxError::StepNotFound("lookup".to_string());
        assert_eq!(err.to_string(), "step 'lookup' not found");
    }

    #[test]
    fn error_display_type_mismatch() {
        let err = EtxError::TypeMismatch {
            field: "id".to_string(),
            expected: "Integer".to_string(),
            actual: "String".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch on field 'id': expected Integer, got String"
        );
    }

    #[test]
    fn error_display_init_failed() {
        let err = EtxError::InitFailed {
            step: "write orders".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("write orders"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn row_failed_carries_diagnostic() {
        let schema = Arc::new(
            RowSchema::new(vec![ValueMeta::new("id", ValueType::Integer)]).unwrap(),
        );
        let row = Row::new(schema, vec![Value::Integer(2)]).unwrap();
        let err = EtxError::row_failed(
            row,
            ErrorDiagnostic::new("bad id", "TEST001").with_field("id"),
        );

        assert!(err.is_row_failure());
        assert_eq!(err.to_string(), "row failed [TEST001]: bad id");
    }

    #[test]
    fn error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EtxError = json_err.into();
        assert!(matches!(err, EtxError::Serialization(_)));
    }
}

//! Engine error types
//!
//! Every failure the engine surfaces carries a stable string code that
//! callers match on. `ErrorInfo` is the serialized face of an error as it
//! appears on execution records and validator results.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::store::StoreError;

/// Wire parse failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Frame header is not followed by `<|message|>`
    MissingMessageToken,
    /// Frame body is not closed by `<|end|>`, `<|call|>` or `<|return|>`
    MissingTerminator,
    /// Frame header carries no role text
    EmptyRole,
    /// Body declared or inferred as JSON does not parse
    InvalidJson,
}

impl ParseErrorKind {
    /// Stable error code for this parse failure
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingMessageToken => "HRF_PARSE_MISSING_MESSAGE",
            Self::MissingTerminator => "HRF_PARSE_MISSING_TERMINATOR",
            Self::EmptyRole => "HRF_PARSE_EMPTY_ROLE",
            Self::InvalidJson => "HRF_PARSE_INVALID_JSON",
        }
    }
}

/// Engine error surface
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("wire parse failed: {message}")]
    Parse {
        kind: ParseErrorKind,
        message: String,
    },

    #[error("envelope schema validation failed: {}", .0.message)]
    EnvelopeSchema(ErrorInfo),

    #[error("script schema validation failed: {}", .0.message)]
    ScriptSchema(ErrorInfo),

    #[error("message carries no harmony script: {0}")]
    MissingScript(String),

    #[error("harmony script has no steps")]
    NoSteps,

    #[error("{kind}: {message}")]
    Execution { kind: String, message: String },

    #[error("required tools unavailable: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("execution service error: {0}")]
    Service(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable string code callers match on
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { kind, .. } => kind.code(),
            Self::EnvelopeSchema(_) => "HRF_SCHEMA_ENVELOPE_FAILED",
            Self::ScriptSchema(_) => "HRF_SCHEMA_SCRIPT_FAILED",
            Self::MissingScript(_) => "MISSING_HARMONY_SCRIPT",
            Self::NoSteps => "NO_HARMONY_STEPS",
            Self::Execution { .. } => "HRF_EXECUTION_ERROR",
            Self::MissingTools(_) => "MISSING_TOOL",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Store(_) | Self::Service(_) => "EXECUTION_SERVICE_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Build a step-execution error with an exception kind
    pub fn execution(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The rejection produced by the expression syntax guard
    pub fn invalid_expression() -> Self {
        Self::execution("InvalidOperation", "Invalid expression syntax")
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }
}

/// Structured error payload attached to records and validation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&EngineError> for ErrorInfo {
    fn from(err: &EngineError) -> Self {
        let details = match err {
            EngineError::EnvelopeSchema(info) | EngineError::ScriptSchema(info) => {
                serde_json::to_value(info).ok()
            }
            EngineError::Execution { kind, .. } => Some(json!({ "exception": kind })),
            EngineError::MissingTools(missing) => Some(json!({ "missing": missing })),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

use thiserror::Error;

use harmonic_core::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    Conflict,
    InvalidArgument,
    Internal,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::NotFound(what) => Self::NotFound(what.clone()),
            EngineError::Parse { .. }
            | EngineError::EnvelopeSchema(_)
            | EngineError::ScriptSchema(_)
            | EngineError::MissingScript(_)
            | EngineError::NoSteps => Self::InvalidArgument(err.to_string()),
            EngineError::Cancelled => Self::Conflict(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

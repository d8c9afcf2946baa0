//! # Harmonic API
//!
//! Stable external payloads and the service surface a transport or remote
//! control-plane consumes. Projection only; all semantics live in
//! harmonic-runtime.

pub mod dto;
mod error;
mod service;

pub use dto::{
    ExecuteRequest, ExecuteResponse, HistoryItemResponse, HistoryResponse, PageRequest,
    SessionListResponse, StatusResponse,
};
pub use error::{ApiError, ErrorCode};
pub use service::{EngineApi, SessionApi};

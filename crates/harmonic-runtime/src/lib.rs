//! # Harmonic Runtime
//!
//! The session service: drives message-by-message execution of registered
//! envelopes with per-session locking, idempotent records, preflight
//! gating, and durable transcripts.

mod bootstrap;
mod config;
mod service;

pub use bootstrap::{EngineApp, EngineAppBuilder};
pub use config::SessionServiceConfig;
pub use service::{ExecuteOptions, ExecutionOutcome, SessionPage, SessionService};

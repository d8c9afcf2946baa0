//! Store and locking contracts
//!
//! This module provides the persistence abstractions:
//! - ScriptStore: registered-envelope persistence (replace semantics)
//! - SessionStore: session row persistence
//! - SessionIndexStore: ordered session listing for paging
//! - LockProvider: per-session mutual exclusion
//!
//! Note: In-memory implementations are in the harmonic-stores crate

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Envelope, Session};

/// Store error types
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Registered-envelope persistence. Registering under an existing id
/// replaces the stored envelope.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    async fn save(&self, script_id: &str, envelope: &Envelope) -> Result<(), StoreError>;

    async fn load(&self, script_id: &str) -> Result<Option<Envelope>, StoreError>;

    async fn delete(&self, script_id: &str) -> Result<bool, StoreError>;
}

/// Session row persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    async fn load(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;
}

/// Ordered session listing for paging.
#[async_trait]
pub trait SessionIndexStore: Send + Sync {
    /// Session ids, optionally filtered by script, ordered by
    /// `updated_at` descending with ties broken by `session_id` ascending.
    async fn list_ids(&self, script_id: Option<&str>) -> Result<Vec<String>, StoreError>;
}

/// Exclusive per-session lock handle. Released on drop.
pub trait LockGuard: Send {}

/// Per-session mutual exclusion.
///
/// Acquisition is bounded only by cancellation; the returned guard must
/// release exactly once on every exit path.
#[async_trait]
pub trait LockProvider: Send + Sync {
    async fn acquire(&self, session_id: &str) -> Result<Box<dyn LockGuard>, StoreError>;
}

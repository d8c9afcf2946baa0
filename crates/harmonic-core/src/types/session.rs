//! Session type definitions
//!
//! Session is the mutable runtime state bound to one registered script.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Artifact, Channel, CiMap, MessageExecutionRecord};
use crate::transcript::normalize_role;

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, nothing executed yet
    Created,
    /// At least one message executed, more remain
    Running,
    /// Current message is executable but preflight failed; retryable
    Blocked,
    /// Envelope (or its script) ran to completion
    Completed,
    /// Executor or service failure
    Failed,
    /// Administratively cancelled
    Cancelled,
}

impl SessionStatus {
    /// Terminal states absorb all further executes
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One durable entry of the user-visible conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Normalized role (lowercase; empty maps to "system")
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    pub timestamp: DateTime<Utc>,
    /// Envelope index that produced this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
}

impl ChatEntry {
    pub fn new(role: impl AsRef<str>, content: impl Into<String>) -> Self {
        Self {
            role: normalize_role(role.as_ref()),
            content: content.into(),
            channel: None,
            timestamp: Utc::now(),
            source_index: None,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_source_index(mut self, index: usize) -> Self {
        self.source_index = Some(index);
        self
    }
}

/// Mutable runtime state bound to one script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub script_id: String,
    pub current_index: usize,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub vars: CiMap<Value>,
    #[serde(default)]
    pub artifacts: CiMap<Artifact>,
    /// Append-only execution history
    #[serde(default)]
    pub history: Vec<MessageExecutionRecord>,
    #[serde(default)]
    pub transcript: Vec<ChatEntry>,
    #[serde(default)]
    pub metadata: CiMap<String>,
    /// Idempotency key -> history position
    #[serde(default)]
    pub execution_id_index: CiMap<usize>,
}

impl Session {
    /// Create a new session bound to a registered script
    pub fn new(script_id: impl Into<String>, metadata: CiMap<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            script_id: script_id.into(),
            current_index: 0,
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
            vars: CiMap::new(),
            artifacts: CiMap::new(),
            history: Vec::new(),
            transcript: Vec::new(),
            metadata,
            execution_id_index: CiMap::new(),
        }
    }

    /// Bump the update timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal_classification() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Created.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(!SessionStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_chat_entry_normalizes_role() {
        let entry = ChatEntry::new("  System ", "hello");
        assert_eq!(entry.role, "system");

        let blank = ChatEntry::new("", "hello");
        assert_eq!(blank.role, "system");
    }

    #[test]
    fn test_new_session_starts_created_at_zero() {
        let session = Session::new("script-a", CiMap::new());
        assert_eq!(session.status, SessionStatus::Created);
        assert_eq!(session.current_index, 0);
        assert!(session.history.is_empty());
        assert!(!session.session_id.is_empty());
    }
}

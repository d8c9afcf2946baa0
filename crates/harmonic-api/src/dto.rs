//! Stable external payloads for execute/status/history/list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use harmonic_core::types::{Artifact, CiMap, MessageExecutionRecord, Session};
use harmonic_runtime::ExecutionOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub session_id: String,
    pub script_id: String,
    pub executed_index: usize,
    pub next_index: usize,
    pub session_status: String,
    pub record: MessageExecutionRecord,
    pub outputs: Vec<Artifact>,
    pub vars: CiMap<Value>,
}

impl From<&ExecutionOutcome> for ExecuteResponse {
    fn from(outcome: &ExecutionOutcome) -> Self {
        Self {
            session_id: outcome.session.session_id.clone(),
            script_id: outcome.session.script_id.clone(),
            executed_index: outcome.executed_index,
            next_index: outcome.next_index,
            session_status: outcome.session.status.as_str().to_string(),
            record: outcome.record.clone(),
            outputs: outcome.record.outputs.clone(),
            vars: outcome.session.vars.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub session_id: String,
    pub script_id: String,
    pub current_index: usize,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history_count: usize,
    pub artifact_count: usize,
    pub metadata: CiMap<String>,
}

impl From<&Session> for StatusResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            script_id: session.script_id.clone(),
            current_index: session.current_index,
            status: session.status.as_str().to_string(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            history_count: session.history.len(),
            artifact_count: session.artifacts.len(),
            metadata: session.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub session_id: String,
    pub script_id: String,
    pub current_index: usize,
    pub status: String,
    pub history: Vec<MessageExecutionRecord>,
}

impl From<&Session> for HistoryResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            script_id: session.script_id.clone(),
            current_index: session.current_index,
            status: session.status.as_str().to_string(),
            history: session.history.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItemResponse {
    pub session_id: String,
    pub script_id: String,
    /// Position in the history sequence
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<MessageExecutionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    pub session_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

/// Paging parameters. `limit` defaults to 50 and is clamped to `[1, 500]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

impl PageRequest {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }
}

/// Body of an execute call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub input: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonic_core::types::SessionStatus;

    #[test]
    fn test_status_projection() {
        let mut session = Session::new("script-a", CiMap::new());
        session.metadata.insert("Owner", "ops".to_string());
        session.set_status(SessionStatus::Running);

        let response = StatusResponse::from(&session);
        assert_eq!(response.script_id, "script-a");
        assert_eq!(response.status, "running");
        assert_eq!(response.history_count, 0);
        assert_eq!(response.metadata.get("owner"), Some(&"ops".to_string()));
    }

    #[test]
    fn test_page_request_serde_shape() {
        let request: PageRequest =
            serde_json::from_str(r#"{ "limit": 2, "continuationToken": "offset:2" }"#).unwrap();
        assert_eq!(request.limit, Some(2));
        assert_eq!(request.continuation_token.as_deref(), Some("offset:2"));

        let empty: PageRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.limit.is_none());
    }
}

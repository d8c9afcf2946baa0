//! Execution record definitions
//!
//! A MessageExecutionRecord captures one drive of one envelope message.
//! Records are immutable once completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Artifact;
use crate::error::ErrorInfo;

/// Terminal and transient states of one execution record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Running,
    Succeeded,
    Blocked,
    Skipped,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Record of one message execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageExecutionRecord {
    /// Envelope index the execution targeted
    pub index: usize,
    /// Caller-supplied idempotency key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub status: RecordStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Light input snapshot (key lists, not values)
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Vec<Artifact>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl MessageExecutionRecord {
    /// Open a record in the Running state
    pub fn begin(index: usize, execution_id: Option<String>) -> Self {
        Self {
            index,
            execution_id,
            status: RecordStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            inputs: Value::Null,
            outputs: Vec::new(),
            logs: Vec::new(),
            error: None,
        }
    }

    /// Close the record with a terminal status
    pub fn complete(&mut self, status: RecordStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    pub fn push_output(&mut self, artifact: Artifact) {
        self.outputs.push(artifact);
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Find an output artifact by name, ignoring case
    pub fn output(&self, name: &str) -> Option<&Artifact> {
        self.outputs
            .iter()
            .find(|artifact| artifact.name.eq_ignore_ascii_case(name))
    }
}

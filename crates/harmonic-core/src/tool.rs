//! Tool collaborator contracts, registry, and invocation recording
//!
//! - `ToolService` / `ToolAvailability`: the external tool backend seams
//! - `ToolRegistry`: in-memory reference implementation of both
//! - `RecordingToolService`: decorator capturing per-invocation traces

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{EngineError, ErrorInfo};

/// External tool backend keyed by `plugin.function` recipients.
#[async_trait]
pub trait ToolService: Send + Sync {
    /// Invoke a tool. Failures propagate to the caller.
    async fn invoke(&self, recipient: &str, args: &Map<String, Value>)
        -> Result<Value, EngineError>;
}

/// Availability oracle consulted by preflight analysis.
#[async_trait]
pub trait ToolAvailability: Send + Sync {
    async fn is_available(&self, recipient: &str) -> bool;

    /// All recipients currently available. May be empty.
    async fn list_available(&self) -> BTreeSet<String>;
}

/// A single registered tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// `plugin.function` identifier (matched case-insensitively)
    fn recipient(&self) -> &str;

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, EngineError>;
}

/// In-memory tool registry.
///
/// Recipients are matched case-insensitively; registration under a
/// case-equivalent recipient replaces.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let key = tool.recipient().to_ascii_lowercase();
        self.tools.write().await.insert(key, tool);
    }

    pub async fn names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolService for ToolRegistry {
    async fn invoke(
        &self,
        recipient: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let tool = {
            let tools = self.tools.read().await;
            tools.get(&recipient.to_ascii_lowercase()).cloned()
        };
        match tool {
            Some(tool) => tool.invoke(args).await,
            None => Err(EngineError::execution(
                "InvalidOperation",
                format!("tool '{}' is not registered", recipient),
            )),
        }
    }
}

#[async_trait]
impl ToolAvailability for ToolRegistry {
    async fn is_available(&self, recipient: &str) -> bool {
        self.tools
            .read()
            .await
            .contains_key(&recipient.to_ascii_lowercase())
    }

    async fn list_available(&self) -> BTreeSet<String> {
        self.tools.read().await.keys().cloned().collect()
    }
}

/// Captured record of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTrace {
    pub recipient: String,
    pub args: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ToolTrace {
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Receives traces as invocations complete.
pub trait TraceSink: Send + Sync {
    fn record(&self, trace: ToolTrace);
}

/// Sink buffering traces for later draining.
#[derive(Default)]
pub struct CollectingTraceSink {
    traces: Mutex<Vec<ToolTrace>>,
}

impl CollectingTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all buffered traces in invocation order.
    pub fn drain(&self) -> Vec<ToolTrace> {
        match self.traces.lock() {
            Ok(mut traces) => std::mem::take(&mut *traces),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl TraceSink for CollectingTraceSink {
    fn record(&self, trace: ToolTrace) {
        match self.traces.lock() {
            Ok(mut traces) => traces.push(trace),
            Err(poisoned) => poisoned.into_inner().push(trace),
        }
    }
}

/// Decorator over a tool service capturing per-invocation traces.
///
/// Failed invocations are recorded, then re-raised.
pub struct RecordingToolService {
    inner: Arc<dyn ToolService>,
    sink: Arc<dyn TraceSink>,
}

impl RecordingToolService {
    pub fn new(inner: Arc<dyn ToolService>, sink: Arc<dyn TraceSink>) -> Self {
        Self { inner, sink }
    }
}

#[async_trait]
impl ToolService for RecordingToolService {
    async fn invoke(
        &self,
        recipient: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let started_at = Utc::now();
        let result = self.inner.invoke(recipient, args).await;
        let completed_at = Utc::now();

        let trace = match &result {
            Ok(value) => ToolTrace {
                recipient: recipient.to_string(),
                args: args.clone(),
                started_at,
                completed_at,
                succeeded: true,
                result: Some(value.clone()),
                error: None,
            },
            Err(err) => ToolTrace {
                recipient: recipient.to_string(),
                args: args.clone(),
                started_at,
                completed_at,
                succeeded: false,
                result: None,
                error: Some(ErrorInfo::from(err)),
            },
        };
        self.sink.record(trace);
        result
    }
}

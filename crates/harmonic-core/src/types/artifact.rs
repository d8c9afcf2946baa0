//! Artifact definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Artifact payload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Text,
    Json,
    ToolTrace,
    Preflight,
}

/// Structured output attached to an execution record or session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

impl Artifact {
    fn new(name: impl Into<String>, kind: ArtifactKind, content: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            content,
            created_at: Utc::now(),
            producer: None,
        }
    }

    /// Create a text artifact
    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(name, ArtifactKind::Text, Value::String(content.into()))
    }

    /// Create a JSON artifact
    pub fn json(name: impl Into<String>, content: Value) -> Self {
        Self::new(name, ArtifactKind::Json, content)
    }

    /// Create a tool-trace artifact
    pub fn tool_trace(name: impl Into<String>, content: Value) -> Self {
        Self::new(name, ArtifactKind::ToolTrace, content)
    }

    /// Create a preflight-report artifact
    pub fn preflight(name: impl Into<String>, content: Value) -> Self {
        Self::new(name, ArtifactKind::Preflight, content)
    }

    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    /// Text payload for text artifacts
    pub fn content_text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifact_constructors_set_kind() {
        assert_eq!(Artifact::text("message", "hi").kind, ArtifactKind::Text);
        assert_eq!(
            Artifact::tool_trace("tool:demo.echo", json!({})).kind,
            ArtifactKind::ToolTrace
        );
        assert_eq!(
            Artifact::preflight("preflight", json!({})).kind,
            ArtifactKind::Preflight
        );
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let artifact = Artifact::tool_trace("tool:demo.echo", json!({}))
            .with_producer("demo.echo");
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["kind"], json!("tool-trace"));
        assert_eq!(value["producer"], json!("demo.echo"));
    }
}

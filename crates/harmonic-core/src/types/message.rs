//! Message and envelope definitions
//!
//! An Envelope is the immutable run template; Messages are its ordered
//! entries. Both round-trip through serde for persistence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing tag on a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Model-internal reasoning, never user-visible
    Analysis,
    /// Tool-side traffic
    Commentary,
    /// User-visible output
    Final,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Commentary => "commentary",
            Self::Final => "final",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "analysis" => Some(Self::Analysis),
            "commentary" => Some(Self::Commentary),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

/// Declared body shape of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Text,
    Json,
    HarmonyScript,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::HarmonyScript => "harmony-script",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            "harmony-script" => Some(Self::HarmonyScript),
            _ => None,
        }
    }
}

/// Frame terminator semantics. Meaningful only for assistant commentary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    Call,
    Return,
    End,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Return => "return",
            Self::End => "end",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "call" => Some(Self::Call),
            "return" => Some(Self::Return),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

/// A single conversation message
///
/// `role` is an open set: `system`, `developer`, `user`, `assistant`, or a
/// tool name for tool-return traffic. `recipient` and `termination` are
/// meaningful only for assistant commentary messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    pub content: Value,
}

impl Message {
    /// Create a plain text message
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            channel: None,
            recipient: None,
            content_type: Some(ContentType::Text),
            termination: None,
            content: Value::String(content.into()),
        }
    }

    /// Create a message with a JSON body
    pub fn json(role: impl Into<String>, content_type: ContentType, content: Value) -> Self {
        Self {
            role: role.into(),
            channel: None,
            recipient: None,
            content_type: Some(content_type),
            termination: None,
            content,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = Some(termination);
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role.trim().eq_ignore_ascii_case("assistant")
    }

    /// True for assistant messages routed to the commentary channel
    pub fn is_commentary(&self) -> bool {
        self.is_assistant() && self.channel == Some(Channel::Commentary)
    }

    /// Body text for text-typed content
    pub fn content_text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

fn default_version() -> String {
    ENVELOPE_VERSION.to_string()
}

/// Envelope format version tag
pub const ENVELOPE_VERSION: &str = "hrf-1";

/// Ordered, immutable sequence of messages defining a run template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_version")]
    pub version: String,
    pub messages: Vec<Message>,
}

impl Envelope {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn message(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }
}

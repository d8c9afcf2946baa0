//! Embedded harmony-script definitions
//!
//! A Script is the typed step program carried by a `harmony-script`
//! message body. Steps are a tagged variant dispatched by `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineError;

/// Typed step program embedded in a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
    /// Default variable bag seeded before session vars are merged over it
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,
}

impl Script {
    /// Decode a script from a message body
    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        serde_json::from_value(value.clone())
            .map_err(|err| EngineError::MissingScript(err.to_string()))
    }
}

/// One step of a script, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Step {
    /// Evaluate expressions and write the results into vars
    ExtractInput {
        /// Mapping var name -> expression
        vars: Map<String, Value>,
    },
    /// Invoke an external tool and store its result
    ToolCall {
        recipient: String,
        /// Must be "commentary"; enforced at execution time
        channel: String,
        #[serde(default)]
        args: Map<String, Value>,
        save_as: String,
    },
    /// Conditional branch
    If {
        condition: String,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Step>,
    },
    /// Emit an assistant message on the analysis or final channel
    AssistantMessage {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(
            default,
            rename = "contentTemplate",
            skip_serializing_if = "Option::is_none"
        )]
        content_template: Option<String>,
    },
    /// Stop executing the script
    Halt,
}

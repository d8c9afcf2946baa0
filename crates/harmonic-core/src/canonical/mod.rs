//! Envelope canonicalization and JSON round-trip
//!
//! Canonical form fills the defaults of the wire grammar, normalizes
//! roles, strips outer CR/LF from text bodies, and enforces the
//! assistant-commentary rule. The canonical JSON document has exactly one
//! root property, `messages`.

mod schema;

pub use schema::{DefaultSchemaValidator, SchemaValidator};

use serde_json::{Map, Value};

use crate::error::{EngineError, ErrorInfo};
use crate::types::{Channel, ContentType, Envelope, Message, Termination};

/// Produce the canonical form of an envelope.
pub fn canonicalize(envelope: &Envelope) -> Result<Envelope, EngineError> {
    let messages = envelope
        .messages
        .iter()
        .map(canonicalize_message)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Envelope {
        version: envelope.version.clone(),
        messages,
    })
}

fn canonicalize_message(message: &Message) -> Result<Message, EngineError> {
    let role = message.role.trim().to_lowercase();
    let is_assistant = role == "assistant";

    let channel = match message.channel {
        Some(channel) => Some(channel),
        None if is_assistant => Some(if message.termination == Some(Termination::Call) {
            Channel::Commentary
        } else {
            Channel::Final
        }),
        None => None,
    };
    let commentary = is_assistant && channel == Some(Channel::Commentary);

    if commentary {
        let recipient_missing = message
            .recipient
            .as_deref()
            .map_or(true, |r| r.trim().is_empty());
        if recipient_missing {
            return Err(reject("assistant commentary message requires a recipient"));
        }
        if message.termination.is_none() {
            return Err(reject(
                "assistant commentary message requires a termination",
            ));
        }
    }

    let content_type = message
        .content_type
        .unwrap_or_else(|| infer_content_type(commentary, message));

    let content = match content_type {
        ContentType::Text => {
            let text = message
                .content
                .as_str()
                .ok_or_else(|| reject("text content must be a string"))?;
            Value::String(
                text.trim_matches(|c| c == '\r' || c == '\n').to_string(),
            )
        }
        ContentType::Json | ContentType::HarmonyScript => {
            if !message.content.is_object() {
                return Err(reject("json content must be an object"));
            }
            message.content.clone()
        }
    };

    Ok(Message {
        role,
        channel,
        recipient: commentary.then(|| message.recipient.clone()).flatten(),
        content_type: Some(content_type),
        termination: if commentary { message.termination } else { None },
        content,
    })
}

fn infer_content_type(commentary: bool, message: &Message) -> ContentType {
    if commentary {
        match message.termination {
            Some(Termination::Call) | Some(Termination::Return) => ContentType::Json,
            _ => {
                if message
                    .content
                    .as_object()
                    .map_or(false, |obj| obj.contains_key("steps"))
                {
                    ContentType::HarmonyScript
                } else if message.content.is_object() {
                    ContentType::Json
                } else {
                    ContentType::Text
                }
            }
        }
    } else {
        ContentType::Text
    }
}

fn reject(message: &str) -> EngineError {
    EngineError::EnvelopeSchema(ErrorInfo::new("HRF_SCHEMA_ENVELOPE_FAILED", message))
}

/// Emit the canonical JSON document for a canonicalized envelope.
pub fn to_canonical_json(envelope: &Envelope) -> Value {
    let messages: Vec<Value> = envelope.messages.iter().map(message_to_canonical).collect();
    let mut root = Map::new();
    root.insert("messages".to_string(), Value::Array(messages));
    Value::Object(root)
}

fn message_to_canonical(message: &Message) -> Value {
    let mut object = Map::new();
    object.insert("role".to_string(), Value::String(message.role.clone()));
    object.insert(
        "channel".to_string(),
        match message.channel {
            Some(channel) => Value::String(channel.as_str().to_string()),
            None => Value::Null,
        },
    );
    object.insert(
        "contentType".to_string(),
        match message.content_type {
            Some(content_type) => Value::String(content_type.as_str().to_string()),
            None => Value::Null,
        },
    );
    if message.is_commentary() {
        if let Some(recipient) = &message.recipient {
            object.insert("recipient".to_string(), Value::String(recipient.clone()));
        }
        if let Some(termination) = message.termination {
            object.insert(
                "termination".to_string(),
                Value::String(termination.as_str().to_string()),
            );
        }
    }
    object.insert("content".to_string(), message.content.clone());
    Value::Object(object)
}

/// Decode an envelope from its canonical JSON document.
pub fn envelope_from_json(value: &Value) -> Result<Envelope, EngineError> {
    serde_json::from_value(value.clone()).map_err(|err| {
        EngineError::EnvelopeSchema(ErrorInfo::new(
            "HRF_SCHEMA_ENVELOPE_FAILED",
            err.to_string(),
        ))
    })
}

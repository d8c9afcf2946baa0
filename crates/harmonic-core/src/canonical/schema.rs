//! Canonical schemas and the pluggable validation boundary
//!
//! Schema evaluation is a black box behind `SchemaValidator`. The default
//! implementation walks the two fixed schema documents below with a small
//! self-contained checker covering the subset they need: type, enum,
//! required, properties, additionalProperties, and items.

use std::sync::OnceLock;

use serde_json::{json, Value};

use crate::error::ErrorInfo;

/// Validation boundary injected into registration and execution.
pub trait SchemaValidator: Send + Sync {
    /// Validate a canonical envelope document. `None` means valid.
    fn validate_envelope(&self, envelope: &Value) -> Option<ErrorInfo>;

    /// Validate an embedded script node. `None` means valid.
    fn validate_script(&self, script: &Value) -> Option<ErrorInfo>;
}

/// Built-in validator over the fixed canonical schemas.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSchemaValidator;

fn envelope_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["messages"],
            "additionalProperties": false,
            "properties": {
                "messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["role", "channel", "contentType", "content"],
                        "additionalProperties": false,
                        "properties": {
                            "role": { "type": "string" },
                            "channel": {
                                "type": ["string", "null"],
                                "enum": ["analysis", "commentary", "final", null]
                            },
                            "contentType": {
                                "type": "string",
                                "enum": ["text", "json", "harmony-script"]
                            },
                            "recipient": { "type": "string" },
                            "termination": {
                                "type": "string",
                                "enum": ["call", "return", "end"]
                            },
                            "content": {}
                        }
                    }
                }
            }
        })
    })
}

fn script_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["steps"],
            "properties": {
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["type"],
                        "properties": {
                            "type": {
                                "type": "string",
                                "enum": [
                                    "extract-input",
                                    "tool-call",
                                    "if",
                                    "assistant-message",
                                    "halt"
                                ]
                            }
                        }
                    }
                },
                "vars": { "type": "object" }
            }
        })
    })
}

impl SchemaValidator for DefaultSchemaValidator {
    fn validate_envelope(&self, envelope: &Value) -> Option<ErrorInfo> {
        check_node(envelope, envelope_schema(), "envelope")
            .err()
            .map(|violation| ErrorInfo::new("HRF_SCHEMA_ENVELOPE_FAILED", violation))
    }

    fn validate_script(&self, script: &Value) -> Option<ErrorInfo> {
        check_node(script, script_schema(), "script")
            .err()
            .map(|violation| ErrorInfo::new("HRF_SCHEMA_SCRIPT_FAILED", violation))
    }
}

/// JSON kind name used in violation messages.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check one document node against one schema node. `location` is the
/// dotted path from the document root ("envelope.messages[0].channel").
///
/// Shape rules (required/properties/items) only apply once the node has
/// passed its `type` rule, so they never fire on a mismatched kind.
fn check_node(value: &Value, schema: &Value, location: &str) -> Result<(), String> {
    let Some(rules) = schema.as_object() else {
        return Err(format!("invalid schema node at {}", location));
    };

    if let Some(kinds) = rules.get("type") {
        check_kind(value, kinds, location)?;
    }

    if let Some(allowed) = rules.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!(
                "{}: value is not one of the allowed values",
                location
            ));
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = rules.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    return Err(format!(
                        "{}: required property '{}' is missing",
                        location, name
                    ));
                }
            }
        }
        if let Some(properties) = rules.get("properties").and_then(Value::as_object) {
            for (name, child_schema) in properties {
                if let Some(child) = object.get(name) {
                    let child_location = format!("{}.{}", location, name);
                    check_node(child, child_schema, &child_location)?;
                }
            }
            if rules.get("additionalProperties").and_then(Value::as_bool) == Some(false) {
                if let Some(unknown) = object.keys().find(|name| !properties.contains_key(*name)) {
                    return Err(format!("{}: unexpected property '{}'", location, unknown));
                }
            }
        }
    }

    if let Some(item_schema) = rules.get("items") {
        if let Some(items) = value.as_array() {
            for (position, item) in items.iter().enumerate() {
                let item_location = format!("{}[{}]", location, position);
                check_node(item, item_schema, &item_location)?;
            }
        }
    }

    Ok(())
}

fn check_kind(value: &Value, kinds: &Value, location: &str) -> Result<(), String> {
    let matches_kind = |name: &str| match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => false,
    };

    let allowed: Vec<&str> = match kinds {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => return Err(format!("invalid schema node at {}", location)),
    };

    if allowed.iter().any(|name| matches_kind(name)) {
        Ok(())
    } else {
        Err(format!(
            "{}: expected {}, found {}",
            location,
            allowed.join(" or "),
            kind_of(value)
        ))
    }
}

//! Preflight tool-dependency analysis
//!
//! Walks an envelope, gathers the tool recipients execution would need,
//! and checks each against the availability collaborator before any step
//! runs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::tool::ToolAvailability;
use crate::types::{ContentType, Envelope, Script, Step, Termination};

/// Result of a preflight pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub required_recipients: Vec<String>,
    pub missing_recipients: Vec<String>,
    pub is_ready: bool,
}

/// Collect the tool recipients an envelope requires, deduplicated
/// case-insensitively in first-seen order.
pub fn required_recipients(envelope: &Envelope) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for message in &envelope.messages {
        if message.is_assistant() && message.termination == Some(Termination::Call) {
            if let Some(recipient) = &message.recipient {
                push_unique(recipient, &mut seen, &mut out);
            }
        }
        if message.content_type == Some(ContentType::HarmonyScript) {
            // undecodable bodies are caught by schema validation at
            // registration; preflight just skips them
            if let Ok(script) = Script::from_value(&message.content) {
                collect_from_steps(&script.steps, &mut seen, &mut out);
            }
        }
    }
    out
}

fn collect_from_steps(steps: &[Step], seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
    for step in steps {
        match step {
            Step::ToolCall { recipient, .. } => push_unique(recipient, seen, out),
            Step::If {
                then, otherwise, ..
            } => {
                collect_from_steps(then, seen, out);
                collect_from_steps(otherwise, seen, out);
            }
            _ => {}
        }
    }
}

fn push_unique(recipient: &str, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
    if seen.insert(recipient.to_ascii_lowercase()) {
        out.push(recipient.to_string());
    }
}

/// Run availability checks over an envelope's required recipients.
pub async fn analyze(
    envelope: &Envelope,
    availability: &dyn ToolAvailability,
) -> PreflightReport {
    let required = required_recipients(envelope);
    let mut missing = Vec::new();
    for recipient in &required {
        if !availability.is_available(recipient).await {
            missing.push(recipient.clone());
        }
    }
    let is_ready = missing.is_empty();
    PreflightReport {
        required_recipients: required,
        missing_recipients: missing,
        is_ready,
    }
}

//! Transcript formatting
//!
//! Stateless, deterministic one-line summaries and role normalization used
//! by the session service when it writes the durable transcript.

/// Lowercase and trim a role; empty roles map to "system".
pub fn normalize_role(role: &str) -> String {
    let normalized = role.trim().to_lowercase();
    if normalized.is_empty() {
        "system".to_string()
    } else {
        normalized
    }
}

/// One-line summary of a tool invocation.
pub fn tool_summary(recipient: &str, succeeded: bool, duration_ms: Option<i64>) -> String {
    let outcome = if succeeded { "ok" } else { "failed" };
    match duration_ms {
        Some(ms) => format!("[tool:{}] {} ({}ms)", recipient, outcome, ms),
        None => format!("[tool:{}] {}", recipient, outcome),
    }
}

/// One-line summary of a preflight block.
pub fn preflight_blocked_summary(missing_count: usize) -> String {
    format!(
        "[preflight] blocked: missing {} required tool(s)",
        missing_count
    )
}

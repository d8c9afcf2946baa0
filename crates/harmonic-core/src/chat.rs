//! Chat collaborator contract

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::{Channel, ChatEntry};

/// Language-model chat backend.
///
/// The engine never retries a call on its own; at-most-once per
/// `(session, index, execution_id)` is guaranteed by the idempotency
/// short-circuit in the session service.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Produce an assistant reply for the given conversation history.
    async fn assistant_reply(&self, history: &[ChatEntry]) -> Result<String, EngineError>;
}

/// Drop entries the model should not see: analysis-channel traffic and
/// empty content. Applied before every dispatch to the chat backend.
pub fn default_history_filter(history: &[ChatEntry]) -> Vec<ChatEntry> {
    history
        .iter()
        .filter(|entry| {
            entry.channel != Some(Channel::Analysis) && !entry.content.trim().is_empty()
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_drops_analysis_and_empty_entries() {
        let history = vec![
            ChatEntry::new("system", "You are Harmony MVP."),
            ChatEntry::new("assistant", "internal note").with_channel(Channel::Analysis),
            ChatEntry::new("user", "   "),
            ChatEntry::new("user", "run it"),
        ];

        let filtered = default_history_filter(&history);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].content, "You are Harmony MVP.");
        assert_eq!(filtered[1].content, "run it");
    }
}

//! ScriptStore in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use harmonic_core::store::{ScriptStore, StoreError};
use harmonic_core::types::Envelope;

/// In-memory implementation for development and testing.
pub struct InMemoryScriptStore {
    envelopes: RwLock<HashMap<String, Envelope>>,
}

impl InMemoryScriptStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self {
            envelopes: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryScriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptStore for InMemoryScriptStore {
    async fn save(&self, script_id: &str, envelope: &Envelope) -> Result<(), StoreError> {
        let mut envelopes = self
            .envelopes
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        envelopes.insert(script_id.to_string(), envelope.clone());
        Ok(())
    }

    async fn load(&self, script_id: &str) -> Result<Option<Envelope>, StoreError> {
        let envelopes = self
            .envelopes
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(envelopes.get(script_id).cloned())
    }

    async fn delete(&self, script_id: &str) -> Result<bool, StoreError> {
        let mut envelopes = self
            .envelopes
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(envelopes.remove(script_id).is_some())
    }
}

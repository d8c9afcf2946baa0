//! Engine assembly
//!
//! Wires stores, locks, and collaborators into a ready `SessionService`.
//! Defaults to the in-memory reference implementations; every seam can be
//! swapped before `build`.

use std::sync::Arc;

use harmonic_core::canonical::SchemaValidator;
use harmonic_core::chat::ChatService;
use harmonic_core::store::{LockProvider, ScriptStore, SessionIndexStore, SessionStore};
use harmonic_core::tool::{ToolAvailability, ToolRegistry, ToolService};
use harmonic_stores::{InMemoryLockProvider, InMemoryScriptStore, InMemorySessionStore};

use crate::config::SessionServiceConfig;
use crate::service::SessionService;

/// An assembled engine
pub struct EngineApp {
    pub service: Arc<SessionService>,
    /// The default tool registry, when no custom tool backend was wired
    pub tools: Option<Arc<ToolRegistry>>,
}

/// Builder wiring the engine's seams
pub struct EngineAppBuilder {
    chat: Arc<dyn ChatService>,
    scripts: Option<Arc<dyn ScriptStore>>,
    sessions: Option<(Arc<dyn SessionStore>, Arc<dyn SessionIndexStore>)>,
    locks: Option<Arc<dyn LockProvider>>,
    tools: Option<(Arc<dyn ToolService>, Arc<dyn ToolAvailability>)>,
    validator: Option<Arc<dyn SchemaValidator>>,
    config: SessionServiceConfig,
}

impl EngineAppBuilder {
    /// Start a builder around the one collaborator that has no default.
    pub fn new(chat: Arc<dyn ChatService>) -> Self {
        Self {
            chat,
            scripts: None,
            sessions: None,
            locks: None,
            tools: None,
            validator: None,
            config: SessionServiceConfig::default(),
        }
    }

    pub fn with_script_store(mut self, scripts: Arc<dyn ScriptStore>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    pub fn with_session_store(
        mut self,
        sessions: Arc<dyn SessionStore>,
        index: Arc<dyn SessionIndexStore>,
    ) -> Self {
        self.sessions = Some((sessions, index));
        self
    }

    pub fn with_lock_provider(mut self, locks: Arc<dyn LockProvider>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_tools(
        mut self,
        tools: Arc<dyn ToolService>,
        availability: Arc<dyn ToolAvailability>,
    ) -> Self {
        self.tools = Some((tools, availability));
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_config(mut self, config: SessionServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> EngineApp {
        let scripts = self
            .scripts
            .unwrap_or_else(|| Arc::new(InMemoryScriptStore::new()));
        let (sessions, index) = self.sessions.unwrap_or_else(|| {
            let store = Arc::new(match self.config.max_sessions {
                Some(max) => InMemorySessionStore::with_max_sessions(max),
                None => InMemorySessionStore::new(),
            });
            (store.clone() as Arc<dyn SessionStore>, store as Arc<dyn SessionIndexStore>)
        });
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(InMemoryLockProvider::new()));

        let (tools, availability, registry) = match self.tools {
            Some((tools, availability)) => (tools, availability, None),
            None => {
                let registry = Arc::new(ToolRegistry::new());
                (
                    registry.clone() as Arc<dyn ToolService>,
                    registry.clone() as Arc<dyn ToolAvailability>,
                    Some(registry),
                )
            }
        };

        let mut service = SessionService::new(
            scripts,
            sessions,
            index,
            locks,
            self.chat,
            tools,
            availability,
        )
        .with_config(self.config);
        if let Some(validator) = self.validator {
            service = service.with_validator(validator);
        }

        EngineApp {
            service: Arc::new(service),
            tools: registry,
        }
    }
}

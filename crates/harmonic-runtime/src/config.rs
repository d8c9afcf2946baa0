//! Service configuration

use serde::{Deserialize, Serialize};

/// Configuration for the session service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionServiceConfig {
    /// Page size used when the caller does not supply a limit
    pub default_page_size: usize,
    /// Hard cap applied to caller-supplied page sizes
    pub max_page_size: usize,
    /// Capacity hint for the in-memory session store wired by the
    /// bootstrap; `None` keeps the store default
    pub max_sessions: Option<usize>,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
            max_sessions: None,
        }
    }
}

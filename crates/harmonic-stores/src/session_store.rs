//! SessionStore in-memory implementation.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use harmonic_core::store::{SessionIndexStore, SessionStore, StoreError};
use harmonic_core::types::Session;

const DEFAULT_IN_MEMORY_SESSION_LIMIT: usize = 5_000;

/// In-memory implementation for development and testing.
///
/// Also serves as the session index: listing orders by `updated_at`
/// descending with ties broken by `session_id` ascending.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    order: RwLock<VecDeque<String>>,
    max_sessions: usize,
}

impl InMemorySessionStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::with_max_sessions(DEFAULT_IN_MEMORY_SESSION_LIMIT)
    }

    /// Create a new in-memory store with a hard capacity limit.
    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    fn touch_order(order: &mut VecDeque<String>, session_id: &str) {
        order.retain(|id| id != session_id);
        order.push_back(session_id.to_string());
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut order = self
            .order
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        if !sessions.contains_key(session.session_id.as_str())
            && sessions.len() >= self.max_sessions
        {
            if let Some(oldest_id) = order.pop_front() {
                sessions.remove(&oldest_id);
            }
        }
        sessions.insert(session.session_id.to_string(), session.clone());
        Self::touch_order(&mut order, session.session_id.as_str());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(sessions.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let removed = sessions.remove(session_id).is_some();
        if removed {
            let mut order = self
                .order
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            order.retain(|id| id != session_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl SessionIndexStore for InMemorySessionStore {
    async fn list_ids(&self, script_id: Option<&str>) -> Result<Vec<String>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut rows: Vec<_> = sessions
            .values()
            .filter(|s| script_id.map_or(true, |id| s.script_id == id))
            .map(|s| (s.updated_at, s.session_id.clone()))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(rows.into_iter().map(|(_, id)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use harmonic_core::types::CiMap;

    fn session(id: &str, script_id: &str, updated_offset_secs: i64) -> Session {
        let mut session = Session::new(script_id, CiMap::new());
        session.session_id = id.to_string();
        session.updated_at = session.updated_at + Duration::seconds(updated_offset_secs);
        session
    }

    #[test]
    fn test_in_memory_session_store_limit() {
        tokio_test::block_on(async {
            let store = InMemorySessionStore::with_max_sessions(2);
            let s1 = session("s1", "script-a", 0);
            let s2 = session("s2", "script-a", 1);
            let s3 = session("s3", "script-a", 2);
            store.save(&s1).await.unwrap();
            store.save(&s2).await.unwrap();
            store.save(&s3).await.unwrap();

            assert!(store.load("s1").await.unwrap().is_none());
            assert!(store.load("s2").await.unwrap().is_some());
            assert!(store.load("s3").await.unwrap().is_some());
        });
    }

    #[test]
    fn test_list_ids_orders_by_updated_at_then_session_id() {
        tokio_test::block_on(async {
            let store = InMemorySessionStore::new();
            store.save(&session("s1", "script-a", 3)).await.unwrap();
            store.save(&session("s2", "script-a", 1)).await.unwrap();
            store.save(&session("s3", "script-a", 2)).await.unwrap();
            store.save(&session("zz", "script-b", 9)).await.unwrap();

            let ids = store.list_ids(Some("script-a")).await.unwrap();
            assert_eq!(ids, vec!["s1", "s3", "s2"]);

            let all = store.list_ids(None).await.unwrap();
            assert_eq!(all.len(), 4);
            assert_eq!(all[0], "zz");
        });
    }

    #[test]
    fn test_list_ids_breaks_timestamp_ties_by_id() {
        tokio_test::block_on(async {
            let store = InMemorySessionStore::new();
            let a = session("b-session", "script-a", 0);
            let mut b = session("a-session", "script-a", 0);
            b.updated_at = a.updated_at;
            store.save(&a).await.unwrap();
            store.save(&b).await.unwrap();

            let ids = store.list_ids(Some("script-a")).await.unwrap();
            assert_eq!(ids, vec!["a-session", "b-session"]);
        });
    }
}

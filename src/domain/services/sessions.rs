#[cfg(test)]
#[path = "sessions_test.rs"]
mod tests;

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::Session;

/// In-memory catalog cache keyed by session ID. Entries live until they are
/// removed, cleared, or the process exits.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn create_id() -> String {
        return Uuid::new_v4().to_string();
    }

    /// Stores the catalog under a freshly generated ID.
    pub fn start(&self, catalog: Value) -> String {
        let id = SessionStore::create_id();
        self.set(&id, catalog);
        tracing::info!(session_id = id, "Started session");

        return id;
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        return self.sessions.get(id).map(|e| return e.value().clone());
    }

    /// Replaces whatever catalog was stored under `id`.
    pub fn set(&self, id: &str, catalog: Value) {
        self.sessions.insert(
            id.to_string(),
            Session {
                id: id.to_string(),
                catalog,
            },
        );
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        return self.sessions.remove(id).map(|(_, session)| return session);
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        return self.sessions.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.sessions.is_empty();
    }
}

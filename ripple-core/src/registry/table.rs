//! The session table.
//!
//! Maps page identifiers to live sessions. Lookups take a read lock so they
//! run concurrently; registration and removal take the write lock. Session
//! teardown always happens after the lock is released, because disposal
//! unsubscribes from the pub/sub backend and may call arbitrary code.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::session::{Session, SessionId};

/// Concurrent table of live page sessions.
///
/// Components are never registered here; they are reached through their
/// page.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page session. An existing entry with the same id is replaced.
    pub fn register(&self, session: Session) {
        if session.is_component() {
            tracing::error!(session = %session.id(), "refusing to register a component");
            return;
        }
        if session.is_dry() {
            tracing::error!("refusing to register a session without an id");
            return;
        }

        let id = session.id().clone();
        let previous = self.sessions.write().insert(id.clone(), session);
        if previous.is_some() {
            tracing::warn!(session = %id, "session id registered twice, replacing entry");
        }
        tracing::debug!(session = %id, sessions = self.len(), "session registered");
    }

    /// Look a session up by id.
    ///
    /// A miss means the session expired or never existed.
    pub fn get(&self, id: &str) -> Result<Session> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Remove an entry without disposing it.
    pub fn unregister(&self, id: &str) -> Option<Session> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            tracing::debug!(session = %id, sessions = self.len(), "session unregistered");
        }
        removed
    }

    /// Dispose a session and remove it.
    pub fn evict(&self, session: &Session) {
        session.dispose();
        self.unregister(session.page_id().as_str());
    }

    /// Remove every session and dispose them. Returns how many there were.
    pub fn drain(&self) -> usize {
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.write();
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in &drained {
            session.dispose();
        }
        tracing::info!(count = drained.len(), "drained sessions");
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone every live session out of the table.
    pub fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use std::sync::Arc;
    use std::thread;

    fn session() -> Session {
        Session::new("/", &Runtime::default())
    }

    #[test]
    fn register_get_unregister() {
        let registry = SessionRegistry::new();
        let s = session();
        let id = s.id().clone();

        registry.register(s);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id.as_str()).unwrap().id(), &id);

        registry.unregister(id.as_str());
        assert!(registry.get(id.as_str()).unwrap_err().is_not_found());
        assert!(registry.is_empty());
    }

    #[test]
    fn components_and_dry_sessions_are_not_registered() {
        let registry = SessionRegistry::new();
        let page = session();
        let view = page.component(|_| {});

        registry.register(view.session().clone());
        registry.register(Session::dry("/", &Runtime::default()));
        assert!(registry.is_empty());
    }

    #[test]
    fn evict_disposes_and_removes() {
        let registry = SessionRegistry::new();
        let s = session();
        registry.register(s.clone());

        registry.evict(&s);
        registry.evict(&s);

        assert!(s.is_disposed());
        assert!(!registry.contains(s.id().as_str()));
    }

    #[test]
    fn drain_disposes_everything() {
        let registry = SessionRegistry::new();
        let sessions: Vec<Session> = (0..3).map(|_| session()).collect();
        for s in &sessions {
            registry.register(s.clone());
        }

        assert_eq!(registry.drain(), 3);
        assert!(registry.is_empty());
        assert!(sessions.iter().all(Session::is_disposed));
    }

    #[test]
    fn concurrent_access() {
        let registry = Arc::new(SessionRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let s = session();
                        let id = s.id().clone();
                        registry.register(s);
                        assert!(registry.get(id.as_str()).is_ok());
                        registry.unregister(id.as_str());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}

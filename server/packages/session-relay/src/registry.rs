use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::transport::SseTransport;

/// Process-wide map from session identifier to its one live transport.
///
/// This is the only shared mutable state in the subsystem; the stream and
/// message endpoints hit it concurrently, including for the same session
/// during teardown races, so every operation is a single atomic map access.
/// The lock is never held across a call back into a transport.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SseTransport>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Binds `transport` as the session's transport. If the id was already
    /// bound (client reconnect) the previous transport is closed after the
    /// map has been updated, so there is never a moment with two writers
    /// claiming one session.
    pub fn register(&self, session_id: &str, transport: Arc<SseTransport>) {
        let previous = self
            .sessions
            .lock()
            .insert(session_id.to_string(), transport);
        if let Some(previous) = previous {
            tracing::info!(session_id, "rebinding session, closing previous transport");
            previous.close();
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SseTransport>> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Idempotent removal; double-remove is a no-op.
    pub fn remove(&self, session_id: &str) -> Option<Arc<SseTransport>> {
        self.sessions.lock().remove(session_id)
    }

    /// Removes the entry only if it still points at `transport`. Used by a
    /// transport's own close path so that closing a superseded transport
    /// cannot evict its replacement.
    pub fn remove_if(&self, session_id: &str, transport: &SseTransport) -> bool {
        let mut sessions = self.sessions.lock();
        let matches = sessions
            .get(session_id)
            .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), transport));
        if matches {
            sessions.remove(session_id);
        }
        matches
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn open(registry: &Arc<SessionRegistry>, id: &str) -> Arc<SseTransport> {
        let (tx, rx) = mpsc::channel(8);
        // Leak the receiver so sends keep succeeding for the test's duration.
        std::mem::forget(rx);
        SseTransport::open(
            id.to_string(),
            &format!("/v1/messages?sessionId={id}"),
            tx,
            registry.clone(),
        )
        .expect("open transport")
    }

    #[test]
    fn register_then_get_then_remove() {
        let registry = Arc::new(SessionRegistry::new());
        let transport = open(&registry, "a");
        registry.register("a", transport.clone());

        let found = registry.get("a").expect("registered session");
        assert!(Arc::ptr_eq(&found, &transport));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn get_unknown_session_is_absent() {
        let registry = Arc::new(SessionRegistry::new());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn rebind_closes_previous_transport() {
        let registry = Arc::new(SessionRegistry::new());
        let first = open(&registry, "a");
        registry.register("a", first.clone());
        let second = open(&registry, "a");
        registry.register("a", second.clone());

        assert!(first.is_closed());
        assert!(!second.is_closed());
        let current = registry.get("a").expect("rebound session");
        assert!(Arc::ptr_eq(&current, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn closing_superseded_transport_does_not_evict_replacement() {
        let registry = Arc::new(SessionRegistry::new());
        let first = open(&registry, "a");
        registry.register("a", first.clone());
        let second = open(&registry, "a");
        registry.register("a", second.clone());

        // Rebinding already closed `first`; its remove_if must have been a
        // no-op against the new entry.
        assert!(!registry.remove_if("a", &first));
        assert!(registry.get("a").is_some());
    }

    #[test]
    fn transport_close_removes_its_own_entry() {
        let registry = Arc::new(SessionRegistry::new());
        let transport = open(&registry, "a");
        registry.register("a", transport.clone());

        transport.close();
        assert!(registry.get("a").is_none());
        // Second close stays a no-op.
        transport.close();
        assert!(registry.is_empty());
    }
}

//! Mock host session backend for testing.

use crate::error::{Result, TransferError};
use crate::providers::{HostSession, HostSessions};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockSession {
    authenticated: bool,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct MockState {
    sessions: HashMap<String, MockSession>,
    // cookie value -> session id, for cookies carrying a routing suffix
    aliases: HashMap<String, String>,
    invalidated: Vec<String>,
}

/// Mock host session backend.
///
/// Uses in-memory storage shared by all clones, so one instance can stand
/// in for the session backend of several virtual hosts. Session cookie
/// values equal session ids unless an alias is registered.
#[derive(Debug, Clone, Default)]
pub struct MockHostSessions {
    state: Arc<Mutex<MockState>>,
    unavailable: Arc<AtomicBool>,
}

fn lock(state: &Mutex<MockState>) -> Result<MutexGuard<'_, MockState>> {
    state
        .lock()
        .map_err(|_| TransferError::SessionStore("Mutex lock failed".to_string()))
}

fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

impl MockHostSessions {
    /// Create an empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn insert(&self, session: &HostSession) -> Result<()> {
        lock(&self.state)?.sessions.insert(
            session.id.clone(),
            MockSession {
                authenticated: session.authenticated,
                attributes: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Mark a session as logged in, as the identity provider login would.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned or the session does not exist.
    pub fn authenticate(&self, session_id: &str) -> Result<()> {
        let mut state = lock(&self.state)?;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| TransferError::SessionStore("session not found".to_string()))?;
        session.authenticated = true;
        Ok(())
    }

    /// Make `cookie_value` resolve to `session_id`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn alias_cookie(&self, cookie_value: &str, session_id: &str) -> Result<()> {
        lock(&self.state)?
            .aliases
            .insert(cookie_value.to_string(), session_id.to_string());
        Ok(())
    }

    /// Simulate a backend outage: every trait call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Get a stored session by id (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn session(&self, session_id: &str) -> Result<Option<HostSession>> {
        Ok(lock(&self.state)?
            .sessions
            .get(session_id)
            .map(|session| HostSession {
                id: session_id.to_string(),
                authenticated: session.authenticated,
            }))
    }

    /// Get a session attribute by session id (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn attribute_of(&self, session_id: &str, name: &str) -> Result<Option<String>> {
        Ok(lock(&self.state)?
            .sessions
            .get(session_id)
            .and_then(|session| session.attributes.get(name).cloned()))
    }

    /// Whether a session was invalidated through the trait (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn is_invalidated(&self, session_id: &str) -> Result<bool> {
        Ok(lock(&self.state)?
            .invalidated
            .iter()
            .any(|id| id == session_id))
    }

    /// Get count of stored sessions (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn session_count(&self) -> Result<usize> {
        Ok(lock(&self.state)?.sessions.len())
    }

    fn check_available(unavailable: &AtomicBool) -> Result<()> {
        if unavailable.load(Ordering::SeqCst) {
            return Err(TransferError::SessionStore(
                "session backend unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl HostSessions for MockHostSessions {
    fn lookup(
        &self,
        cookie_value: &str,
    ) -> impl Future<Output = Result<Option<HostSession>>> + Send {
        let state = Arc::clone(&self.state);
        let unavailable = Arc::clone(&self.unavailable);
        let cookie_value = cookie_value.to_string();

        async move {
            Self::check_available(&unavailable)?;
            let state = lock(&state)?;

            let id = state.aliases.get(&cookie_value).unwrap_or(&cookie_value);
            Ok(state.sessions.get(id).map(|session| HostSession {
                id: id.clone(),
                authenticated: session.authenticated,
            }))
        }
    }

    fn create(&self) -> impl Future<Output = Result<HostSession>> + Send {
        let state = Arc::clone(&self.state);
        let unavailable = Arc::clone(&self.unavailable);
        let id = random_id();

        async move {
            Self::check_available(&unavailable)?;
            lock(&state)?
                .sessions
                .insert(id.clone(), MockSession::default());
            Ok(HostSession::anonymous(id))
        }
    }

    fn attribute(
        &self,
        session: &HostSession,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>>> + Send {
        let state = Arc::clone(&self.state);
        let unavailable = Arc::clone(&self.unavailable);
        let id = session.id.clone();
        let name = name.to_string();

        async move {
            Self::check_available(&unavailable)?;
            Ok(lock(&state)?
                .sessions
                .get(&id)
                .and_then(|session| session.attributes.get(&name).cloned()))
        }
    }

    fn set_attribute(
        &self,
        session: &HostSession,
        name: &str,
        value: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        let state = Arc::clone(&self.state);
        let unavailable = Arc::clone(&self.unavailable);
        let id = session.id.clone();
        let name = name.to_string();
        let value = value.to_string();

        async move {
            Self::check_available(&unavailable)?;
            let mut state = lock(&state)?;
            let session = state
                .sessions
                .get_mut(&id)
                .ok_or_else(|| TransferError::SessionStore("session not found".to_string()))?;
            session.attributes.insert(name, value);
            Ok(())
        }
    }

    fn remove_attribute(
        &self,
        session: &HostSession,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        let state = Arc::clone(&self.state);
        let unavailable = Arc::clone(&self.unavailable);
        let id = session.id.clone();
        let name = name.to_string();

        async move {
            Self::check_available(&unavailable)?;
            if let Some(session) = lock(&state)?.sessions.get_mut(&id) {
                session.attributes.remove(&name);
            }
            Ok(())
        }
    }

    fn invalidate(&self, session: &HostSession) -> impl Future<Output = Result<()>> + Send {
        let state = Arc::clone(&self.state);
        let unavailable = Arc::clone(&self.unavailable);
        let id = session.id.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut state = lock(&state)?;
            state.sessions.remove(&id);
            state.aliases.retain(|_, target| *target != id);
            state.invalidated.push(id);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_lookup_and_attributes() {
        let sessions = MockHostSessions::new();
        let session = sessions.create().await.unwrap();
        assert_eq!(session.id.len(), 32);
        assert!(!session.authenticated);

        sessions.set_attribute(&session, "k", "v").await.unwrap();
        assert_eq!(sessions.attribute(&session, "k").await.unwrap().as_deref(), Some("v"));

        sessions.remove_attribute(&session, "k").await.unwrap();
        assert_eq!(sessions.attribute(&session, "k").await.unwrap(), None);

        sessions.authenticate(&session.id).unwrap();
        let found = sessions.lookup(&session.id).await.unwrap().unwrap();
        assert!(found.authenticated);
    }

    #[tokio::test]
    async fn test_alias_resolves_routing_suffix() {
        let sessions = MockHostSessions::new();
        sessions.insert(&HostSession::authenticated("abc")).unwrap();
        sessions.alias_cookie("abc.node1", "abc").unwrap();

        let found = sessions.lookup("abc.node1").await.unwrap().unwrap();
        assert_eq!(found.id, "abc");
    }

    #[tokio::test]
    async fn test_invalidate_removes_session() {
        let sessions = MockHostSessions::new();
        let session = HostSession::anonymous("gone");
        sessions.insert(&session).unwrap();

        sessions.invalidate(&session).await.unwrap();

        assert!(sessions.lookup("gone").await.unwrap().is_none());
        assert!(sessions.is_invalidated("gone").unwrap());
        assert_eq!(sessions.session_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails() {
        let sessions = MockHostSessions::new();
        sessions.set_unavailable(true);
        assert!(matches!(
            sessions.create().await,
            Err(TransferError::SessionStore(_))
        ));
    }
}

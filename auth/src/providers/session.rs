//! Host session trait.

use crate::error::Result;
use std::fmt;

/// A session of the hosting web application.
#[derive(Clone, PartialEq, Eq)]
pub struct HostSession {
    /// Session identifier, the value the host puts in its session cookie.
    pub id: String,

    /// Whether a user has authenticated on this session.
    pub authenticated: bool,
}

impl HostSession {
    /// A fresh, anonymous session.
    #[must_use]
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authenticated: false,
        }
    }

    /// A session a user has logged in on.
    #[must_use]
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authenticated: true,
        }
    }
}

impl fmt::Debug for HostSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSession")
            .field("id", &"<redacted>")
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

/// The hosting application's session handling.
///
/// # Implementation Notes
///
/// - All hosts of one deployment share the session backend, so a session
///   created on the primary host can be looked up on a target host
/// - Attributes are small strings (the transfer token)
pub trait HostSessions: Send + Sync {
    /// Resolve the session a session cookie value refers to.
    ///
    /// The cookie value may carry a routing suffix the session id lacks.
    ///
    /// # Returns
    ///
    /// `None` if no live session matches.
    ///
    /// # Errors
    ///
    /// Returns error if the session backend fails.
    fn lookup(
        &self,
        cookie_value: &str,
    ) -> impl std::future::Future<Output = Result<Option<HostSession>>> + Send;

    /// Create a new anonymous session.
    ///
    /// # Errors
    ///
    /// Returns error if the session backend fails.
    fn create(&self) -> impl std::future::Future<Output = Result<HostSession>> + Send;

    /// Read a session attribute.
    ///
    /// # Errors
    ///
    /// Returns error if the session backend fails.
    fn attribute(
        &self,
        session: &HostSession,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Write a session attribute.
    ///
    /// # Errors
    ///
    /// Returns error if the session backend fails or the session is gone.
    fn set_attribute(
        &self,
        session: &HostSession,
        name: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove a session attribute. Removing an absent attribute is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the session backend fails.
    fn remove_attribute(
        &self,
        session: &HostSession,
        name: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Invalidate a session.
    ///
    /// # Errors
    ///
    /// Returns error if the session backend fails.
    fn invalidate(
        &self,
        session: &HostSession,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

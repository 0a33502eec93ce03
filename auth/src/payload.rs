//! Transfer payload carried by a token through the protocol phases.

use chrono::{DateTime, Utc};
use std::fmt;

/// What a token stands for.
///
/// Created when a transfer is initiated (`created_at` and `final_url`) and
/// enriched once on the primary host with the target host and the captured
/// cookie values. Fields are only ever added.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferPayload {
    created_at: DateTime<Utc>,
    final_url: String,
    target_host: Option<String>,
    session_id: Option<String>,
    auth_cookie: Option<String>,
}

impl TransferPayload {
    /// Start a payload for a transfer ending at `final_url`.
    #[must_use]
    pub fn new(final_url: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            final_url: final_url.into(),
            target_host: None,
            session_id: None,
            auth_cookie: None,
        }
    }

    /// Record the host the session must be installed on.
    #[must_use]
    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    /// Record the session cookie value to transfer.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Record the secondary authentication cookie value, if any.
    #[must_use]
    pub fn with_auth_cookie(mut self, value: Option<String>) -> Self {
        if value.is_some() {
            self.auth_cookie = value;
        }
        self
    }

    /// When the transfer was initiated.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Where the browser ends up after the transfer.
    #[must_use]
    pub fn final_url(&self) -> &str {
        &self.final_url
    }

    /// Host the session is bound to, once prepared.
    #[must_use]
    pub fn target_host(&self) -> Option<&str> {
        self.target_host.as_deref()
    }

    /// Transferred session cookie value, once prepared.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Transferred secondary authentication cookie value.
    #[must_use]
    pub fn auth_cookie(&self) -> Option<&str> {
        self.auth_cookie.as_deref()
    }
}

impl fmt::Debug for TransferPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferPayload")
            .field("created_at", &self.created_at)
            .field("final_url", &crate::utils::without_query(&self.final_url))
            .field("target_host", &self.target_host)
            .field("session_id", &self.session_id.as_ref().map(|_| "<redacted>"))
            .field("auth_cookie", &self.auth_cookie.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_enrichment() {
        let payload = TransferPayload::new("https://b.example/page");
        assert_eq!(payload.target_host(), None);
        assert_eq!(payload.session_id(), None);

        let payload = payload
            .with_target_host("b.example")
            .with_session_id("0123456789abcdefghijklmnopqrstuv")
            .with_auth_cookie(None);

        assert_eq!(payload.target_host(), Some("b.example"));
        assert_eq!(payload.session_id(), Some("0123456789abcdefghijklmnopqrstuv"));
        assert_eq!(payload.auth_cookie(), None);
        assert!(payload.created_at() <= Utc::now());
    }

    #[test]
    fn test_auth_cookie_is_never_cleared() {
        let payload = TransferPayload::new("/")
            .with_auth_cookie(Some("formauth".into()))
            .with_auth_cookie(None);
        assert_eq!(payload.auth_cookie(), Some("formauth"));
    }

    #[test]
    fn test_debug_redacts_cookie_values() {
        let payload = TransferPayload::new("https://b.example/page?q=1")
            .with_target_host("b.example")
            .with_session_id("secret-session")
            .with_auth_cookie(Some("secret-auth".into()));

        let rendered = format!("{payload:?}");
        assert!(!rendered.contains("secret-session"));
        assert!(!rendered.contains("secret-auth"));
        assert!(!rendered.contains("q=1"));
        assert!(rendered.contains("b.example"));
    }
}

//! Error types for session transfer operations.

use http::StatusCode;
use thiserror::Error;

/// Result type alias for session transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Failure reasons of the session transfer protocol.
///
/// Every phase operation returns one of these instead of raising. The
/// gateway turns them into redirects or `400`/`403`/`500` responses at the
/// phase boundary; none of them is meant to escape as a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    // ═══════════════════════════════════════════════════════════
    // Flow Control
    // ═══════════════════════════════════════════════════════════

    /// Session transfer is switched off; callers pass the request through.
    #[error("Session transfer is disabled")]
    Disabled,

    // ═══════════════════════════════════════════════════════════
    // Token Errors
    // ═══════════════════════════════════════════════════════════

    /// No token in the request parameter or the session attribute.
    #[error("Session transfer token is missing")]
    TokenMissing,

    /// Token never existed, was already consumed, or has expired.
    #[error("Session transfer token timed out or invalid")]
    TokenUnknownOrExpired,

    /// Token is live but the primary host never packaged a session for it.
    #[error("Session transfer was not prepared")]
    TransferIncomplete,

    // ═══════════════════════════════════════════════════════════
    // Session Errors
    // ═══════════════════════════════════════════════════════════

    /// The primary host request carries no session cookie to transfer.
    #[error("No session cookie to transfer")]
    SessionMissing,

    /// Transfer redeemed at a host other than the one it was issued for.
    #[error("Session transfer for {expected} received at unexpected host {actual}")]
    HostMismatch {
        /// Host recorded when the transfer was prepared
        expected: String,
        /// Host actually serving the transfer request
        actual: String,
    },

    /// Session cookie and local session id diverge before the similarity threshold.
    #[error("Session cookie value is strangely different from session id ({difference})")]
    SessionIdentifierAnomaly {
        /// Length of the common prefix of both identifiers
        difference: usize,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// A URL built or stored by this subsystem could not be parsed again.
    #[error("Redirect target unresolvable: {0}")]
    RedirectTargetUnresolvable(String),

    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The secure random source failed.
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    /// The host's session collaborator failed.
    #[error("Session store error: {0}")]
    SessionStore(String),
}

impl TransferError {
    /// Returns `true` if the failure stems from what the browser sent.
    ///
    /// # Examples
    ///
    /// ```
    /// # use session_bridge_auth::TransferError;
    /// assert!(TransferError::TokenMissing.is_user_error());
    /// assert!(!TransferError::SessionStore("down".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::TokenMissing
                | Self::TokenUnknownOrExpired
                | Self::TransferIncomplete
                | Self::SessionMissing
        )
    }

    /// Returns `true` if this error indicates a possible attack.
    ///
    /// # Examples
    ///
    /// ```
    /// # use session_bridge_auth::TransferError;
    /// let err = TransferError::HostMismatch {
    ///     expected: "b.example".into(),
    ///     actual: "evil.example".into(),
    /// };
    /// assert!(err.is_security_issue());
    /// assert!(!TransferError::TokenMissing.is_security_issue());
    /// ```
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::HostMismatch { .. } | Self::SessionIdentifierAnomaly { .. }
        )
    }

    /// Returns `true` for conditions that point at a bug or a broken
    /// collaborator rather than at the request.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::RedirectTargetUnresolvable(_)
                | Self::InvalidConfiguration(_)
                | Self::TokenGeneration(_)
                | Self::SessionStore(_)
        )
    }

    /// HTTP status a request failing with this error is answered with.
    ///
    /// User errors are `400`, security issues `403`, a disabled service
    /// `503` and everything else `500`.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        if self.is_user_error() {
            StatusCode::BAD_REQUEST
        } else if self.is_security_issue() {
            StatusCode::FORBIDDEN
        } else if matches!(self, Self::Disabled) {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Message that may be shown to the client.
    ///
    /// Security and internal errors stay generic so host names and backend
    /// details never leave the server.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_security_issue() {
            "Forbidden".to_string()
        } else if self.is_internal() {
            "Session transfer failed".to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_disjoint() {
        let all = [
            TransferError::Disabled,
            TransferError::TokenMissing,
            TransferError::TokenUnknownOrExpired,
            TransferError::TransferIncomplete,
            TransferError::SessionMissing,
            TransferError::HostMismatch {
                expected: "a".into(),
                actual: "b".into(),
            },
            TransferError::SessionIdentifierAnomaly { difference: 3 },
            TransferError::RedirectTargetUnresolvable("x".into()),
            TransferError::InvalidConfiguration("x".into()),
            TransferError::TokenGeneration("x".into()),
            TransferError::SessionStore("x".into()),
        ];

        for err in &all {
            let hits = [err.is_user_error(), err.is_security_issue(), err.is_internal()]
                .iter()
                .filter(|hit| **hit)
                .count();
            assert!(hits <= 1, "{err:?} falls into more than one category");
        }
        assert!(!TransferError::Disabled.is_user_error());
        assert!(!TransferError::Disabled.is_internal());
    }

    #[test]
    fn test_status_codes_and_public_messages() {
        let mismatch = TransferError::HostMismatch {
            expected: "b.example".into(),
            actual: "c.example".into(),
        };
        assert_eq!(mismatch.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(mismatch.public_message(), "Forbidden");

        assert_eq!(TransferError::TokenMissing.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            TransferError::TokenMissing.public_message(),
            TransferError::TokenMissing.to_string()
        );

        assert_eq!(TransferError::Disabled.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let store = TransferError::SessionStore("redis down".into());
        assert_eq!(store.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.public_message(), "Session transfer failed");
    }

    #[test]
    fn test_host_mismatch_message_names_both_hosts() {
        let err = TransferError::HostMismatch {
            expected: "b.example".into(),
            actual: "c.example".into(),
        };
        assert_eq!(
            err.to_string(),
            "Session transfer for b.example received at unexpected host c.example"
        );
    }
}

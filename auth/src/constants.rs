//! Session transfer constants.
//!
//! Protocol names and defaults shared by the coordinator, the gateway and
//! the web integration.

/// Query parameter carrying the transfer token between hosts.
pub const PARAM_TOKEN: &str = "token";

/// Session attribute under which a host remembers the token of the transfer
/// it is taking part in.
pub const SESSION_TOKEN_ATTRIBUTE: &str = "session-bridge#token";

/// Length of a transfer token.
pub const TOKEN_LENGTH: usize = 32;

/// Session identifiers sharing at least this many leading characters are
/// considered the same session (they may differ by a routing suffix).
pub const SESSION_ID_SIMILARITY_THRESHOLD: usize = 30;

/// Cookie defaults.
pub mod cookies {
    /// Default session cookie name.
    pub const SESSION_COOKIE: &str = "JSESSIONID";

    /// Default secondary authentication cookie name.
    pub const AUTH_COOKIE: &str = "sling.formauth";

    /// Cookie path used when none is configured.
    pub const DEFAULT_PATH: &str = "/";
}

/// Default protocol endpoint paths.
pub mod paths {
    /// Primary host: remembers the token and forwards to the trigger path.
    pub const PREPARE: &str = "/bin/public/auth/session/prepare";

    /// Primary host, protected: packages the session and hands off.
    pub const TRIGGER: &str = "/bin/private/auth/session";

    /// Target host: installs the transferred session.
    pub const TRANSFER: &str = "/bin/public/auth/session/transfer";

    /// Target host: the identity provider's own callback.
    pub const GUARD: &str = "/bin/public/auth/saml";
}

/// Default time-to-live values in milliseconds.
pub mod ttl {
    /// Login phase: long enough for an interactive identity-provider login.
    pub const LOGIN_MILLIS: u64 = 300_000;

    /// Transfer phase: one browser redirect hop.
    pub const TRANSFER_MILLIS: u64 = 5_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_leaves_room_for_routing_suffix() {
        assert!(SESSION_ID_SIMILARITY_THRESHOLD < TOKEN_LENGTH);
    }

    #[test]
    fn test_transfer_phase_is_shorter_than_login_phase() {
        assert!(ttl::TRANSFER_MILLIS < ttl::LOGIN_MILLIS);
        assert!(ttl::TRANSFER_MILLIS < 10_000);
    }
}

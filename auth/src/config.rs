//! Session transfer configuration.
//!
//! Configuration values are supplied by the hosting application (usually
//! deserialized from its own config source) and validated once, when the
//! [`TransferCoordinator`](crate::TransferCoordinator) is built.

use crate::constants::{cookies, paths, ttl};
use crate::error::{Result, TransferError};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Session and authentication cookie attributes.
///
/// CAUTION: these must match the hosting web server's own session cookie
/// configuration, otherwise the transferred cookie is not picked up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Name of the session cookie.
    ///
    /// Default: `JSESSIONID`
    pub session_cookie_name: String,

    /// Name of the secondary authentication cookie, transferred when present.
    ///
    /// Default: `sling.formauth`
    pub auth_cookie_name: String,

    /// Cookie domain; no `Domain` attribute when unset.
    pub domain: Option<String>,

    /// Cookie path.
    ///
    /// Default: `/`
    pub path: Option<String>,

    /// `Secure` attribute.
    ///
    /// Default: `false`
    pub secure: bool,

    /// `HttpOnly` attribute.
    ///
    /// Default: `true`
    pub http_only: bool,
}

impl CookieConfig {
    /// Set the session cookie name.
    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    /// Set the secondary authentication cookie name.
    #[must_use]
    pub fn with_auth_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.auth_cookie_name = name.into();
        self
    }

    /// Set the cookie domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the cookie path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the `Secure` attribute.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the `HttpOnly` attribute.
    #[must_use]
    pub const fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Effective cookie path; blank or missing falls back to `/`.
    #[must_use]
    pub fn effective_path(&self) -> &str {
        self.path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .unwrap_or(cookies::DEFAULT_PATH)
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: cookies::SESSION_COOKIE.to_string(),
            auth_cookie_name: cookies::AUTH_COOKIE.to_string(),
            domain: None,
            path: None,
            secure: false,
            http_only: true,
        }
    }
}

/// Transfer coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// On/off switch. When off every transfer operation is a no-op.
    ///
    /// Default: `false`
    pub enabled: bool,

    /// URL of the primary authentication host, where the identity provider
    /// redirects after login (e.g. `https://auth.example.com`).
    ///
    /// Mandatory when enabled.
    pub authentication_host_url: Option<String>,

    /// Validity of the token between initiating a transfer and the primary
    /// host packaging the session. Must cover an interactive login.
    ///
    /// Default: 300 000 ms (5 minutes)
    pub login_ttl_millis: u64,

    /// Validity of the packaged session, covering a single redirect hop.
    ///
    /// Default: 5 000 ms
    pub transfer_ttl_millis: u64,

    /// Cookie names and attributes.
    pub cookies: CookieConfig,
}

impl TransferConfig {
    /// Create an enabled configuration for the given primary authentication host.
    ///
    /// # Arguments
    ///
    /// * `authentication_host_url` - e.g. `"https://auth.example.com"`
    #[must_use]
    pub fn new(authentication_host_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            authentication_host_url: Some(authentication_host_url.into()),
            ..Self::default()
        }
    }

    /// Create a disabled configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Set the login-phase time-to-live.
    #[must_use]
    pub const fn with_login_ttl(mut self, millis: u64) -> Self {
        self.login_ttl_millis = millis;
        self
    }

    /// Set the transfer-phase time-to-live.
    #[must_use]
    pub const fn with_transfer_ttl(mut self, millis: u64) -> Self {
        self.transfer_ttl_millis = millis;
        self
    }

    /// Set cookie names and attributes.
    #[must_use]
    pub fn with_cookies(mut self, cookies: CookieConfig) -> Self {
        self.cookies = cookies;
        self
    }

    /// Login-phase time-to-live.
    #[must_use]
    pub const fn login_ttl(&self) -> Duration {
        Duration::from_millis(self.login_ttl_millis)
    }

    /// Transfer-phase time-to-live.
    #[must_use]
    pub const fn transfer_ttl(&self) -> Duration {
        Duration::from_millis(self.transfer_ttl_millis)
    }

    /// Check the configuration and parse the primary host URL.
    ///
    /// Returns `None` for a disabled configuration, which needs no URL.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfiguration`] if an enabled
    /// configuration lacks an absolute primary URL with a host, or has a
    /// zero time-to-live.
    pub fn validate(&self) -> Result<Option<Url>> {
        if !self.enabled {
            return Ok(None);
        }

        let raw = self
            .authentication_host_url
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| {
                TransferError::InvalidConfiguration(
                    "authentication_host_url is mandatory when enabled".to_string(),
                )
            })?;

        let url = Url::parse(raw).map_err(|e| {
            TransferError::InvalidConfiguration(format!("authentication_host_url '{raw}': {e}"))
        })?;
        if url.host_str().is_none() {
            return Err(TransferError::InvalidConfiguration(format!(
                "authentication_host_url '{raw}' has no host"
            )));
        }

        if self.login_ttl_millis == 0 || self.transfer_ttl_millis == 0 {
            return Err(TransferError::InvalidConfiguration(
                "time-to-live values must be greater than zero".to_string(),
            ));
        }
        if self.transfer_ttl_millis > self.login_ttl_millis {
            tracing::warn!(
                login_ttl_millis = self.login_ttl_millis,
                transfer_ttl_millis = self.transfer_ttl_millis,
                "transfer phase outlives the login phase"
            );
        }

        if self.cookies.session_cookie_name.trim().is_empty() {
            return Err(TransferError::InvalidConfiguration(
                "session_cookie_name must not be blank".to_string(),
            ));
        }

        Ok(Some(url))
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            authentication_host_url: None,
            login_ttl_millis: ttl::LOGIN_MILLIS,
            transfer_ttl_millis: ttl::TRANSFER_MILLIS,
            cookies: CookieConfig::default(),
        }
    }
}

/// Access gateway configuration: the protocol endpoint paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Path on the primary host that remembers the token and forwards to
    /// the protected trigger path.
    pub prepare_uri: String,

    /// Protected path on the primary host that packages the authenticated
    /// session and hands it off to the target host.
    pub trigger_uri: String,

    /// Path on the target host that installs the transferred session.
    pub transfer_uri: String,

    /// The identity provider's callback path. Hits outside an active
    /// transfer are blocked; `None` disables the guard.
    pub guard_uri: Option<String>,

    /// Path prefixes that require an authenticated session. Feeds the
    /// default [`ProtectedPrefixes`](crate::providers::ProtectedPrefixes)
    /// access policy.
    pub protected_prefixes: Vec<String>,

    /// Redirect target for blocked requests, with `${scheme}`, `${host}`,
    /// `${port}`, `${path}` and `${query}` placeholders. Blocked requests
    /// get a `403` when unset.
    pub blocked_redirect: Option<String>,
}

impl GatewayConfig {
    /// Set the prepare path.
    #[must_use]
    pub fn with_prepare_uri(mut self, uri: impl Into<String>) -> Self {
        self.prepare_uri = uri.into();
        self
    }

    /// Set the trigger path.
    #[must_use]
    pub fn with_trigger_uri(mut self, uri: impl Into<String>) -> Self {
        self.trigger_uri = uri.into();
        self
    }

    /// Set the transfer path.
    #[must_use]
    pub fn with_transfer_uri(mut self, uri: impl Into<String>) -> Self {
        self.transfer_uri = uri.into();
        self
    }

    /// Set or clear the guard path.
    #[must_use]
    pub fn with_guard_uri(mut self, uri: Option<String>) -> Self {
        self.guard_uri = uri;
        self
    }

    /// Add a protected path prefix.
    #[must_use]
    pub fn with_protected_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.protected_prefixes.push(prefix.into());
        self
    }

    /// Set the blocked-request redirect template.
    #[must_use]
    pub fn with_blocked_redirect(mut self, template: impl Into<String>) -> Self {
        self.blocked_redirect = Some(template.into());
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            prepare_uri: paths::PREPARE.to_string(),
            trigger_uri: paths::TRIGGER.to_string(),
            transfer_uri: paths::TRANSFER.to_string(),
            guard_uri: Some(paths::GUARD.to_string()),
            protected_prefixes: Vec::new(),
            blocked_redirect: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_config_builder() {
        let config = TransferConfig::new("https://auth.example.com")
            .with_login_ttl(60_000)
            .with_transfer_ttl(3_000)
            .with_cookies(CookieConfig::default().with_domain("example.com").with_secure(true));

        assert!(config.enabled);
        assert_eq!(config.login_ttl(), Duration::from_secs(60));
        assert_eq!(config.transfer_ttl(), Duration::from_secs(3));
        assert_eq!(config.cookies.domain.as_deref(), Some("example.com"));
        assert!(config.cookies.secure);
        assert!(config.cookies.http_only);
    }

    #[test]
    fn test_default_configs() {
        let transfer = TransferConfig::default();
        assert!(!transfer.enabled);
        assert_eq!(transfer.login_ttl_millis, 300_000);
        assert_eq!(transfer.transfer_ttl_millis, 5_000);
        assert_eq!(transfer.cookies.session_cookie_name, "JSESSIONID");
        assert_eq!(transfer.cookies.auth_cookie_name, "sling.formauth");

        let gateway = GatewayConfig::default();
        assert_eq!(gateway.prepare_uri, "/bin/public/auth/session/prepare");
        assert_eq!(gateway.trigger_uri, "/bin/private/auth/session");
        assert_eq!(gateway.transfer_uri, "/bin/public/auth/session/transfer");
        assert_eq!(gateway.guard_uri.as_deref(), Some("/bin/public/auth/saml"));
        assert!(gateway.blocked_redirect.is_none());
        assert!(gateway.protected_prefixes.is_empty());
    }

    #[test]
    fn test_validate_disabled_needs_no_url() {
        assert_eq!(TransferConfig::disabled().validate(), Ok(None));
    }

    #[test]
    fn test_validate_rejects_missing_primary_url() {
        let config = TransferConfig {
            enabled: true,
            ..TransferConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TransferError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_relative_or_hostless_url() {
        for raw in ["auth.example.com/login", "mailto:someone@example.com", "   "] {
            let config = TransferConfig::new(raw);
            assert!(
                matches!(config.validate(), Err(TransferError::InvalidConfiguration(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = TransferConfig::new("https://auth.example.com").with_transfer_ttl(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_returns_parsed_url() {
        let url = TransferConfig::new("https://auth.example.com:8443")
            .validate()
            .unwrap()
            .expect("enabled config yields a url");
        assert_eq!(url.host_str(), Some("auth.example.com"));
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn test_effective_cookie_path() {
        assert_eq!(CookieConfig::default().effective_path(), "/");
        assert_eq!(CookieConfig::default().with_path("  ").effective_path(), "/");
        assert_eq!(CookieConfig::default().with_path("/app").effective_path(), "/app");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TransferConfig = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "authentication_host_url": "https://auth.example.com",
            "cookies": { "domain": "example.com" }
        }))
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.transfer_ttl_millis, 5_000);
        assert_eq!(config.cookies.session_cookie_name, "JSESSIONID");
        assert_eq!(config.cookies.domain.as_deref(), Some("example.com"));

        let gateway: GatewayConfig = serde_json::from_value(serde_json::json!({
            "guard_uri": null,
            "blocked_redirect": "${scheme}://${host}/"
        }))
        .unwrap();
        assert!(gateway.guard_uri.is_none());
        assert_eq!(gateway.transfer_uri, "/bin/public/auth/session/transfer");
    }
}

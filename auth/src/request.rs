//! Request and cookie values exchanged with the hosting web layer.
//!
//! The core never sees framework request types. The web integration builds a
//! [`TransferRequest`] per inbound request and renders the
//! [`SessionCookie`]s it gets back as `Set-Cookie` headers.

use crate::config::CookieConfig;
use crate::providers::HostSession;
use std::fmt;

/// The parts of an inbound request the transfer protocol looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    cookies: Vec<(String, String)>,
    session: Option<HostSession>,
}

impl TransferRequest {
    /// Create a request for `scheme://host{path}`.
    #[must_use]
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port: None,
            path: path.into(),
            query: None,
            cookies: Vec::new(),
            session: None,
        }
    }

    /// Set an explicit port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the raw (still encoded) query string, without the leading `?`.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    /// Add a request cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Attach the host session this request belongs to.
    #[must_use]
    pub fn with_session(mut self, session: HostSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Request scheme, `http` or `https`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name, without port.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, if the request named one.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Port the request was served on, falling back to the scheme default.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port
            .unwrap_or(if self.scheme.eq_ignore_ascii_case("https") { 443 } else { 80 })
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Decoded value of the first query parameter called `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .ok()?
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Value of the first cookie called `name`.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The host session, if one was resolved for this request.
    #[must_use]
    pub const fn session(&self) -> Option<&HostSession> {
        self.session.as_ref()
    }

    /// Replace the resolved host session.
    pub fn set_session(&mut self, session: Option<HostSession>) {
        self.session = session;
    }

    /// Full request URL including the query string.
    #[must_use]
    pub fn url(&self) -> String {
        let mut url = if self.host.contains(':') {
            format!("{}://[{}]", self.scheme, self.host)
        } else {
            format!("{}://{}", self.scheme, self.host)
        };
        if let Some(port) = self.port {
            let default = if self.scheme.eq_ignore_ascii_case("https") { 443 } else { 80 };
            if port != default {
                url.push_str(&format!(":{port}"));
            }
        }
        url.push_str(&self.path);
        if let Some(query) = &self.query {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// A cookie to set on the browser.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// `Domain` attribute.
    pub domain: Option<String>,
    /// `Path` attribute.
    pub path: String,
    /// `Secure` attribute.
    pub secure: bool,
    /// `HttpOnly` attribute.
    pub http_only: bool,
}

impl SessionCookie {
    /// Cookie `name=value` carrying the configured attributes.
    #[must_use]
    pub fn from_config(
        config: &CookieConfig,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: config
                .domain
                .as_deref()
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(str::to_string),
            path: config.effective_path().to_string(),
            secure: config.secure,
            http_only: config.http_only,
        }
    }

    /// Render as a `Set-Cookie` header value.
    ///
    /// # Examples
    ///
    /// ```
    /// use session_bridge_auth::{CookieConfig, SessionCookie};
    ///
    /// let config = CookieConfig::default().with_domain("example.com").with_secure(true);
    /// let cookie = SessionCookie::from_config(&config, "JSESSIONID", "abc");
    /// assert_eq!(
    ///     cookie.to_header_value(),
    ///     "JSESSIONID=abc; Path=/; Domain=example.com; Secure; HttpOnly"
    /// );
    /// ```
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(domain) = &self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_omits_default_port() {
        let request = TransferRequest::new("https", "b.example", "/page")
            .with_port(443)
            .with_query("a=1");
        assert_eq!(request.url(), "https://b.example/page?a=1");

        let request = TransferRequest::new("http", "b.example", "/page").with_port(8080);
        assert_eq!(request.url(), "http://b.example:8080/page");
        assert_eq!(request.effective_port(), 8080);
    }

    #[test]
    fn test_url_brackets_ipv6_host() {
        let request = TransferRequest::new("http", "::1", "/private/page").with_port(3000);
        assert_eq!(request.url(), "http://[::1]:3000/private/page");
    }

    #[test]
    fn test_query_param_is_decoded() {
        let request = TransferRequest::new("https", "a.example", "/p")
            .with_query("x=1&token=abc%2Bdef&token=ignored");
        assert_eq!(request.query_param("token").as_deref(), Some("abc+def"));
        assert_eq!(request.query_param("missing"), None);
    }

    #[test]
    fn test_empty_query_is_none() {
        let request = TransferRequest::new("https", "a.example", "/p").with_query("");
        assert_eq!(request.query(), None);
        assert_eq!(request.url(), "https://a.example/p");
    }

    #[test]
    fn test_cookie_lookup() {
        let request = TransferRequest::new("https", "a.example", "/")
            .with_cookie("JSESSIONID", "one")
            .with_cookie("other", "two");
        assert_eq!(request.cookie("JSESSIONID"), Some("one"));
        assert_eq!(request.cookie("nope"), None);
    }

    #[test]
    fn test_cookie_header_without_optional_attributes() {
        let config = CookieConfig::default().with_http_only(false).with_path("/app");
        let cookie = SessionCookie::from_config(&config, "sid", "v");
        assert_eq!(cookie.to_header_value(), "sid=v; Path=/app");
        assert!(!format!("{cookie:?}").contains("\"v\""));
    }
}

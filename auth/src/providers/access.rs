//! Access policy: which paths require an authenticated session.

/// Decides whether a request path requires authentication.
pub trait AccessPolicy: Send + Sync {
    /// `true` if `path` may only be served to an authenticated session.
    fn requires_authentication(&self, path: &str) -> bool;
}

impl<F> AccessPolicy for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn requires_authentication(&self, path: &str) -> bool {
        self(path)
    }
}

/// Protects every path under a set of prefixes.
///
/// A prefix matches on segment boundaries: `/private` protects `/private`
/// and `/private/x` but not `/privateer`.
///
/// # Examples
///
/// ```
/// use session_bridge_auth::providers::{AccessPolicy, ProtectedPrefixes};
///
/// let policy = ProtectedPrefixes::new(["/private"]);
/// assert!(policy.requires_authentication("/private/report"));
/// assert!(!policy.requires_authentication("/privateer"));
/// assert!(!policy.requires_authentication("/public"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedPrefixes(Vec<String>);

impl ProtectedPrefixes {
    /// Create a policy from path prefixes.
    #[must_use]
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self(
            prefixes
                .into_iter()
                .map(Into::<String>::into)
                .filter(|prefix| !prefix.is_empty())
                .collect(),
        )
    }

    /// The configured prefixes.
    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.0
    }
}

impl AccessPolicy for ProtectedPrefixes {
    fn requires_authentication(&self, path: &str) -> bool {
        self.0.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            prefix.is_empty()
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

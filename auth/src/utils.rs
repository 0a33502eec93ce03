//! Utility functions for session transfer.

use crate::constants::SESSION_ID_SIMILARITY_THRESHOLD;

/// Index of the first character at which two strings differ.
///
/// Returns `None` when both are equal. When one string is a prefix of the
/// other the index is the length of the shorter one.
///
/// # Examples
///
/// ```
/// use session_bridge_auth::utils::index_of_difference;
///
/// assert_eq!(index_of_difference("abcde", "abxyz"), Some(2));
/// assert_eq!(index_of_difference("abc", "abcdef"), Some(3));
/// assert_eq!(index_of_difference("abc", "abc"), None);
/// ```
#[must_use]
pub fn index_of_difference(a: &str, b: &str) -> Option<usize> {
    if a == b {
        return None;
    }
    let common = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    Some(common)
}

/// Whether two session identifiers denote the same session.
///
/// Load balancers append routing suffixes to session identifiers, so ids
/// agreeing on at least [`SESSION_ID_SIMILARITY_THRESHOLD`] leading
/// characters are treated as one session.
///
/// # Examples
///
/// ```
/// use session_bridge_auth::utils::same_session;
///
/// let id = "0123456789abcdefghijklmnopqrstuv";
/// assert!(same_session(id, id));
/// assert!(same_session(id, "0123456789abcdefghijklmnopqrstXY.node2"));
/// assert!(!same_session(id, "0123456789XXXXXXXXXXXXXXXXXXXXXX"));
/// ```
#[must_use]
pub fn same_session(a: &str, b: &str) -> bool {
    index_of_difference(a, b).is_none_or(|diff| diff >= SESSION_ID_SIMILARITY_THRESHOLD)
}

/// Strip the query string and fragment from a URL for logging.
///
/// Transfer URLs carry the token as a query parameter, which must never
/// reach a log sink.
#[must_use]
pub fn without_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Expand `${name}` placeholders in a template.
///
/// Unknown placeholders are left untouched.
///
/// # Examples
///
/// ```
/// use session_bridge_auth::utils::expand_template;
///
/// let url = expand_template(
///     "${scheme}://${host}:${port}/denied",
///     &[("scheme", "https"), ("host", "b.example"), ("port", "443")],
/// );
/// assert_eq!(url, "https://b.example:443/denied");
/// ```
#[must_use]
pub fn expand_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match values.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

//! Request adapters.
//!
//! Builds the framework-agnostic [`TransferRequest`] from HTTP request
//! parts, honouring reverse-proxy headers:
//!
//! - **Host**: `X-Forwarded-Host` (first entry), then `Host`, then the URI
//!   authority
//! - **Scheme**: `X-Forwarded-Proto` (first entry), then the URI scheme,
//!   then `http`
//! - **Cookies**: every `Cookie` header, split on `;`
//!
//! # Example
//!
//! ```ignore
//! use session_bridge_web::extractors::TransferContext;
//!
//! async fn handler(TransferContext(request): TransferContext) -> String {
//!     format!("served {} for {}", request.path(), request.host())
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, Uri, header, request::Parts, uri::Authority},
};
use session_bridge_auth::TransferRequest;

/// Header naming the host the client originally asked for.
pub const FORWARDED_HOST_HEADER: &str = "X-Forwarded-Host";

/// Header naming the scheme the client originally used.
pub const FORWARDED_PROTO_HEADER: &str = "X-Forwarded-Proto";

/// The inbound request as the transfer protocol sees it.
///
/// The session is not resolved; the gateway does that on demand.
#[derive(Debug, Clone)]
pub struct TransferContext(pub TransferRequest);

#[async_trait]
impl<S> FromRequestParts<S> for TransferContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(transfer_request(&parts.uri, &parts.headers)))
    }
}

/// Build a [`TransferRequest`] from a request URI and its headers.
#[must_use]
pub fn transfer_request(uri: &Uri, headers: &HeaderMap) -> TransferRequest {
    let scheme = first_header_value(headers, FORWARDED_PROTO_HEADER)
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string())
        .to_ascii_lowercase();

    let authority = first_header_value(headers, FORWARDED_HOST_HEADER)
        .or_else(|| first_header_value(headers, header::HOST.as_str()))
        .and_then(|raw| raw.parse::<Authority>().ok())
        .or_else(|| uri.authority().cloned());

    let (host, port) = match &authority {
        Some(authority) => (
            authority
                .host()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_ascii_lowercase(),
            authority.port_u16(),
        ),
        None => ("localhost".to_string(), None),
    };

    let mut request = TransferRequest::new(scheme, host, uri.path());
    if let Some(port) = port {
        request = request.with_port(port);
    }
    if let Some(query) = uri.query() {
        request = request.with_query(query);
    }
    for (name, value) in cookies(headers) {
        request = request.with_cookie(name, value);
    }
    request
}

/// First comma-separated entry of a header, trimmed.
fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// All `name=value` pairs of all `Cookie` headers.
fn cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| {
            (
                name.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            )
        })
        .collect()
}

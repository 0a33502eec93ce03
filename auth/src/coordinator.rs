//! Transfer coordinator: the three-phase redirect protocol.
//!
//! # Flow
//!
//! ```text
//! target host            primary host                         target host
//! ───────────            ────────────                         ───────────
//! initiate ──redirect──► prepare (remember token)
//!                        trigger (IdP login, then package) ──► transfer
//!                                                              (set cookie,
//!                                                               redirect to
//!                                                               final URL)
//! ```
//!
//! The coordinator owns the [`TokenStore`]. Each phase reads or replaces the
//! [`TransferPayload`] stored under the token; the last phase consumes it.

use crate::config::TransferConfig;
use crate::constants::PARAM_TOKEN;
use crate::error::{Result, TransferError};
use crate::payload::TransferPayload;
use crate::providers::HostSessions;
use crate::request::{SessionCookie, TransferRequest};
use crate::stores::{TokenStore, TransferToken};
use crate::utils::{index_of_difference, same_session, without_query};
use std::sync::Arc;
use url::{Host, Url};

/// Outcome of a successful transfer on the target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    /// Where to send the browser.
    pub final_url: String,

    /// Cookies to set on the response.
    pub cookies: Vec<SessionCookie>,

    /// Whether a foreign local session was invalidated first.
    pub invalidated_session: bool,
}

/// Coordinates session transfers between the primary authentication host
/// and the virtual hosts of a deployment.
///
/// Created once per deployment and shared (`Arc`) with every request
/// handler. When the configuration is disabled every phase operation
/// returns [`TransferError::Disabled`].
pub struct TransferCoordinator<S> {
    config: TransferConfig,
    primary: Option<Url>,
    store: TokenStore,
    sessions: Arc<S>,
}

impl<S: HostSessions> TransferCoordinator<S> {
    /// Build a coordinator from a configuration and the host's sessions.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfiguration`] if the configuration
    /// is enabled but unusable.
    pub fn new(config: TransferConfig, sessions: Arc<S>) -> Result<Self> {
        let primary = config.validate()?;

        match &primary {
            Some(url) => tracing::info!(
                primary_host = url.host_str().unwrap_or_default(),
                login_ttl_millis = config.login_ttl_millis,
                transfer_ttl_millis = config.transfer_ttl_millis,
                "session transfer enabled"
            ),
            None => tracing::info!("session transfer disabled"),
        }

        Ok(Self {
            config,
            primary,
            store: TokenStore::new(),
            sessions,
        })
    }

    /// The configuration this coordinator was built from.
    #[must_use]
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// The host session backend.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<S> {
        &self.sessions
    }

    /// The token store (for diagnostics and tests).
    #[must_use]
    pub const fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Whether session transfer is switched on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.primary.is_some()
    }

    /// Whether `request` was served by the primary authentication host.
    ///
    /// Always `false` when disabled.
    #[must_use]
    pub fn is_primary_auth_host(&self, request: &TransferRequest) -> bool {
        self.primary
            .as_ref()
            .and_then(request_host)
            .is_some_and(|host| host.eq_ignore_ascii_case(request.host()))
    }

    fn primary(&self) -> Result<&Url> {
        self.primary.as_ref().ok_or(TransferError::Disabled)
    }

    /// Start a transfer on a virtual host.
    ///
    /// `url` is where the browser should end up once the session is
    /// installed, resolved against the request URL when relative. Defaults
    /// to the current request URL.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Disabled`] when switched off
    /// - [`TransferError::RedirectTargetUnresolvable`] for an unusable `url`
    /// - [`TransferError::TokenGeneration`] if the random source fails
    pub fn initiate_session_transfer(
        &self,
        request: &TransferRequest,
        url: Option<&str>,
    ) -> Result<TransferToken> {
        self.primary()?;

        let current = request.url();
        let final_url = match url {
            Some(url) => Url::parse(&current)
                .and_then(|base| base.join(url))
                .map_err(|e| TransferError::RedirectTargetUnresolvable(e.to_string()))?
                .to_string(),
            None => current,
        };

        tracing::debug!(
            host = %request.host(),
            final_url = %without_query(&final_url),
            "initiating session transfer"
        );

        self.store
            .save(TransferPayload::new(final_url), self.config.login_ttl())
    }

    /// URL on the primary host at path `uri`, carrying the token.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Disabled`] when switched off
    /// - [`TransferError::RedirectTargetUnresolvable`] if `uri` cannot be
    ///   joined to the primary URL
    pub fn authentication_url(&self, token: &TransferToken, uri: &str) -> Result<String> {
        with_token(self.primary()?, uri, token)
    }

    /// Package the authenticated session on the primary host.
    ///
    /// Captures the session cookie (and the secondary authentication cookie
    /// when present) and binds the transfer to the host of the final URL.
    /// The payload is stored again with the short transfer-phase TTL.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Disabled`] when switched off
    /// - [`TransferError::TokenUnknownOrExpired`] for a dead token
    /// - [`TransferError::SessionMissing`] without a session cookie
    /// - [`TransferError::SessionIdentifierAnomaly`] if the session cookie
    ///   does not belong to the request's session
    pub fn prepare_session_transfer(
        &self,
        request: &TransferRequest,
        token: &TransferToken,
    ) -> Result<()> {
        self.primary()?;

        let payload = self
            .store
            .peek::<TransferPayload>(token)
            .ok_or(TransferError::TokenUnknownOrExpired)?;

        let final_url = Url::parse(payload.final_url())
            .map_err(|e| TransferError::RedirectTargetUnresolvable(e.to_string()))?;
        let target_host = request_host(&final_url).unwrap_or_else(|| request.host().to_string());

        let cookies = &self.config.cookies;
        let session_cookie = request
            .cookie(&cookies.session_cookie_name)
            .ok_or(TransferError::SessionMissing)?;

        if let Some(session) = request
            .session()
            .filter(|session| !same_session(session_cookie, &session.id))
        {
            let difference = index_of_difference(session_cookie, &session.id).unwrap_or_default();
            tracing::warn!(
                host = %request.host(),
                difference,
                "session cookie does not match the session"
            );
            return Err(TransferError::SessionIdentifierAnomaly { difference });
        }

        let auth_cookie = request.cookie(&cookies.auth_cookie_name).map(str::to_string);
        let payload = payload
            .with_target_host(target_host.clone())
            .with_session_id(session_cookie)
            .with_auth_cookie(auth_cookie);

        if !self.store.push(token, payload, self.config.transfer_ttl()) {
            return Err(TransferError::TokenUnknownOrExpired);
        }

        tracing::debug!(target_host = %target_host, "session packaged for transfer");
        Ok(())
    }

    /// URL on the transfer's target host at path `uri`, carrying the token.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Disabled`] when switched off
    /// - [`TransferError::TokenUnknownOrExpired`] for a dead token
    /// - [`TransferError::RedirectTargetUnresolvable`] if the stored final
    ///   URL cannot be parsed
    pub fn session_host_url(&self, token: &TransferToken, uri: &str) -> Result<String> {
        self.primary()?;

        let payload = self
            .store
            .peek::<TransferPayload>(token)
            .ok_or(TransferError::TokenUnknownOrExpired)?;
        let final_url = Url::parse(payload.final_url())
            .map_err(|e| TransferError::RedirectTargetUnresolvable(e.to_string()))?;

        with_token(&final_url, uri, token)
    }

    /// Install the transferred session on the target host.
    ///
    /// Consumes the token. A local session that is not the transferred one
    /// is invalidated before any cookie is issued.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Disabled`] when switched off
    /// - [`TransferError::TokenUnknownOrExpired`] for a dead token
    /// - [`TransferError::TransferIncomplete`] if the primary host never
    ///   packaged a session for the token
    /// - [`TransferError::HostMismatch`] if redeemed on another host
    /// - [`TransferError::SessionStore`] if invalidation fails
    pub async fn perform_session_transfer(
        &self,
        request: &TransferRequest,
        token: &TransferToken,
    ) -> Result<CompletedTransfer> {
        self.primary()?;

        let payload = self
            .store
            .retrieve_and_delete::<TransferPayload>(token)
            .ok_or(TransferError::TokenUnknownOrExpired)?;

        let (Some(target_host), Some(session_id)) = (payload.target_host(), payload.session_id())
        else {
            tracing::warn!(host = %request.host(), "session transfer was never prepared");
            return Err(TransferError::TransferIncomplete);
        };

        if target_host != request.host() {
            tracing::error!(
                expected = %target_host,
                actual = %request.host(),
                "session transfer redeemed at the wrong host"
            );
            return Err(TransferError::HostMismatch {
                expected: target_host.to_string(),
                actual: request.host().to_string(),
            });
        }

        let mut set_session_cookie = true;
        let mut invalidated_session = false;
        match request.session() {
            Some(local) if local.id == session_id => set_session_cookie = false,
            Some(local) if !same_session(&local.id, session_id) => {
                tracing::debug!(host = %request.host(), "invalidating foreign local session");
                self.sessions.invalidate(local).await?;
                invalidated_session = true;
            }
            _ => {}
        }

        let config = &self.config.cookies;
        let mut cookies = Vec::with_capacity(2);
        if set_session_cookie {
            cookies.push(SessionCookie::from_config(
                config,
                &config.session_cookie_name,
                session_id,
            ));
        }
        if let Some(auth_cookie) = payload.auth_cookie() {
            cookies.push(SessionCookie::from_config(
                config,
                &config.auth_cookie_name,
                auth_cookie,
            ));
        }

        tracing::info!(
            host = %request.host(),
            final_url = %without_query(payload.final_url()),
            invalidated_session,
            "session transferred"
        );

        Ok(CompletedTransfer {
            final_url: payload.final_url().to_string(),
            cookies,
            invalidated_session,
        })
    }

    /// The final URL of a transfer.
    ///
    /// With `close` the token is consumed, aborting the transfer.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Disabled`] when switched off
    /// - [`TransferError::TokenUnknownOrExpired`] for a dead token
    pub fn final_url(&self, token: &TransferToken, close: bool) -> Result<String> {
        self.primary()?;

        let payload = if close {
            self.store.retrieve_and_delete::<TransferPayload>(token)
        } else {
            self.store.peek::<TransferPayload>(token)
        };
        payload
            .map(|payload| payload.final_url().to_string())
            .ok_or(TransferError::TokenUnknownOrExpired)
    }
}

impl<S> std::fmt::Debug for TransferCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferCoordinator")
            .field("primary", &self.primary.as_ref().map(Url::as_str))
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Host of `url` in the form [`TransferRequest::host`] reports it: IPv6
/// literals without brackets.
fn request_host(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Ipv6(addr) => Some(addr.to_string()),
        host => Some(host.to_string()),
    }
}

fn with_token(base: &Url, uri: &str, token: &TransferToken) -> Result<String> {
    let mut url = base
        .join(uri)
        .map_err(|e| TransferError::RedirectTargetUnresolvable(e.to_string()))?;
    url.set_fragment(None);
    url.query_pairs_mut().append_pair(PARAM_TOKEN, token.as_str());
    Ok(url.to_string())
}

//! Access gateway: routes requests into the transfer protocol.
//!
//! The dispatcher looks at every inbound request, decides whether it belongs
//! to the transfer protocol and drives the matching coordinator phase. It
//! returns a [`GatewayDecision`]; the web layer turns that into a response
//! or forwards the request to the application.
//!
//! # States
//!
//! | Request | State | Action |
//! |---------|-------|--------|
//! | prepare path | `Prepare` | remember token, redirect to trigger path |
//! | trigger path, authenticated | `RedirectToTarget` | package session, redirect to target host |
//! | transfer path | `Transfer` | set session cookie, redirect to final URL |
//! | guard path | `Blocked` | abort transfer or block |
//! | protected path, anonymous, not primary | `Trigger` | redirect to primary host |
//! | anything else | `PassThrough` | none |

use crate::config::GatewayConfig;
use crate::constants::{PARAM_TOKEN, SESSION_TOKEN_ATTRIBUTE};
use crate::coordinator::TransferCoordinator;
use crate::error::{Result, TransferError};
use crate::providers::{AccessPolicy, HostSession, HostSessions, ProtectedPrefixes};
use crate::request::{SessionCookie, TransferRequest};
use crate::stores::TransferToken;
use crate::utils::{expand_template, without_query};
use http::StatusCode;
use std::sync::Arc;

/// Where a request ended up in the transfer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayState {
    /// Not part of the protocol.
    PassThrough,
    /// Anonymous request for a protected resource; transfer initiated.
    Trigger,
    /// Token remembered on the primary host.
    Prepare,
    /// Session packaged on the primary host, browser sent to the target.
    RedirectToTarget,
    /// Session installed on the target host.
    Transfer,
    /// Request refused or transfer aborted.
    Blocked,
}

impl GatewayState {
    /// Stable lowercase name, for logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::Trigger => "trigger",
            Self::Prepare => "prepare",
            Self::RedirectToTarget => "redirect_to_target",
            Self::Transfer => "transfer",
            Self::Blocked => "blocked",
        }
    }
}

/// What the web layer should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayAction {
    /// Hand the request to the application.
    PassThrough,

    /// Answer with a redirect.
    Redirect {
        /// `Location` header value.
        location: String,
        /// Cookies to set on the redirect response.
        cookies: Vec<SessionCookie>,
    },

    /// Answer with an error status.
    Reject {
        /// Response status.
        status: StatusCode,
        /// Human-readable reason.
        message: String,
    },
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayDecision {
    /// Protocol state reached.
    pub state: GatewayState,
    /// Response to produce.
    pub action: GatewayAction,
}

impl GatewayDecision {
    /// Leave the request to the application.
    #[must_use]
    pub const fn pass_through() -> Self {
        Self {
            state: GatewayState::PassThrough,
            action: GatewayAction::PassThrough,
        }
    }

    fn redirect(state: GatewayState, location: String, cookies: Vec<SessionCookie>) -> Self {
        Self {
            state,
            action: GatewayAction::Redirect { location, cookies },
        }
    }

    fn reject(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            state: GatewayState::Blocked,
            action: GatewayAction::Reject {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether the application should serve the request.
    #[must_use]
    pub const fn is_pass_through(&self) -> bool {
        matches!(self.action, GatewayAction::PassThrough)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Prepare,
    Trigger,
    Transfer,
    Guard,
    Protected,
    Public,
}

/// Per-request entry point of the session transfer protocol.
///
/// Holds the shared coordinator, the endpoint paths and the access policy.
/// Cheap to share behind an `Arc`; keeps no per-request state.
pub struct AccessGatewayDispatcher<S, P = ProtectedPrefixes> {
    coordinator: Arc<TransferCoordinator<S>>,
    config: GatewayConfig,
    policy: P,
}

impl<S: HostSessions> AccessGatewayDispatcher<S, ProtectedPrefixes> {
    /// Dispatcher protecting the configured path prefixes.
    #[must_use]
    pub fn with_protected_prefixes(
        coordinator: Arc<TransferCoordinator<S>>,
        config: GatewayConfig,
    ) -> Self {
        let policy = ProtectedPrefixes::new(config.protected_prefixes.iter().cloned());
        Self::new(coordinator, config, policy)
    }
}

impl<S: HostSessions, P: AccessPolicy> AccessGatewayDispatcher<S, P> {
    /// Create a dispatcher.
    #[must_use]
    pub const fn new(
        coordinator: Arc<TransferCoordinator<S>>,
        config: GatewayConfig,
        policy: P,
    ) -> Self {
        Self {
            coordinator,
            config,
            policy,
        }
    }

    /// The shared coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<TransferCoordinator<S>> {
        &self.coordinator
    }

    /// The endpoint configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Decide what to do with one inbound request.
    ///
    /// Never fails: protocol errors become [`GatewayState::Blocked`]
    /// decisions. When the request carries no resolved session, it is looked
    /// up from the session cookie, but only for requests that need one.
    pub async fn dispatch(&self, mut request: TransferRequest) -> GatewayDecision {
        if !self.coordinator.is_enabled() {
            return GatewayDecision::pass_through();
        }

        let route = self.route(&request);
        if route == Route::Public {
            return GatewayDecision::pass_through();
        }

        let resolved = self.resolve_session(&mut request).await;
        if let Err(err) = resolved {
            return self.fail(&request, err);
        }

        let result = match route {
            Route::Prepare => self.prepare(&request).await,
            Route::Trigger => self.trigger(&request).await,
            Route::Transfer => self.transfer(&request).await,
            Route::Guard => self.guard(&request).await,
            Route::Protected => {
                if request.session().is_some_and(|session| session.authenticated) {
                    Ok(GatewayDecision::pass_through())
                } else {
                    self.initiate(&request).await
                }
            }
            Route::Public => Ok(GatewayDecision::pass_through()),
        };

        let decision = result.unwrap_or_else(|err| self.fail(&request, err));
        tracing::debug!(
            host = %request.host(),
            path = %request.path(),
            state = decision.state.as_str(),
            "gateway decision"
        );
        decision
    }

    fn route(&self, request: &TransferRequest) -> Route {
        let path = request.path();
        if path == self.config.prepare_uri {
            Route::Prepare
        } else if path == self.config.trigger_uri {
            Route::Trigger
        } else if path == self.config.transfer_uri {
            Route::Transfer
        } else if self.config.guard_uri.as_deref() == Some(path) {
            Route::Guard
        } else if self.policy.requires_authentication(path)
            && !self.coordinator.is_primary_auth_host(request)
        {
            Route::Protected
        } else {
            Route::Public
        }
    }

    async fn resolve_session(&self, request: &mut TransferRequest) -> Result<()> {
        if request.session().is_some() {
            return Ok(());
        }
        let cookie_name = &self.coordinator.config().cookies.session_cookie_name;
        let Some(cookie) = request.cookie(cookie_name).map(str::to_string) else {
            return Ok(());
        };
        let session = self.coordinator.sessions().lookup(&cookie).await?;
        request.set_session(session);
        Ok(())
    }

    /// Anonymous request for a protected resource on a virtual host.
    async fn initiate(&self, request: &TransferRequest) -> Result<GatewayDecision> {
        let (session, cookies) = self.ensure_session(request).await?;
        let token = self.coordinator.initiate_session_transfer(request, None)?;
        self.remember(&session, &token).await?;

        let location = self
            .coordinator
            .authentication_url(&token, &self.config.prepare_uri)?;
        Ok(GatewayDecision::redirect(GatewayState::Trigger, location, cookies))
    }

    /// Primary host: remember the token, then go through the host's login.
    async fn prepare(&self, request: &TransferRequest) -> Result<GatewayDecision> {
        let Some(raw) = request.query_param(PARAM_TOKEN) else {
            if let Some(session) = request.session() {
                self.forget(session).await?;
            }
            return Err(TransferError::TokenMissing);
        };
        let token = TransferToken::parse(&raw).ok_or(TransferError::TokenUnknownOrExpired)?;

        let (session, cookies) = self.ensure_session(request).await?;
        self.remember(&session, &token).await?;

        let location = self
            .coordinator
            .authentication_url(&token, &self.config.trigger_uri)?;
        Ok(GatewayDecision::redirect(GatewayState::Prepare, location, cookies))
    }

    /// Primary host, after login: package the session and hand it off.
    async fn trigger(&self, request: &TransferRequest) -> Result<GatewayDecision> {
        let token = self.token(request).await?;

        let Some(session) = request.session().filter(|session| session.authenticated) else {
            tracing::debug!(host = %request.host(), "awaiting login before session transfer");
            return Ok(GatewayDecision::pass_through());
        };

        self.coordinator.prepare_session_transfer(request, &token)?;
        self.forget(session).await?;

        let location = self
            .coordinator
            .session_host_url(&token, &self.config.transfer_uri)?;
        Ok(GatewayDecision::redirect(
            GatewayState::RedirectToTarget,
            location,
            Vec::new(),
        ))
    }

    /// Target host: install the session.
    async fn transfer(&self, request: &TransferRequest) -> Result<GatewayDecision> {
        let token = self.token(request).await?;
        let completed = self
            .coordinator
            .perform_session_transfer(request, &token)
            .await?;

        if let Some(session) = request.session().filter(|_| !completed.invalidated_session) {
            if let Err(err) = self.forget(session).await {
                tracing::warn!(error = %err, "could not clear the remembered transfer token");
            }
        }

        Ok(GatewayDecision::redirect(
            GatewayState::Transfer,
            completed.final_url,
            completed.cookies,
        ))
    }

    /// Identity provider callback hit on a virtual host.
    async fn guard(&self, request: &TransferRequest) -> Result<GatewayDecision> {
        let final_url = match self.token(request).await {
            Ok(token) => self.coordinator.final_url(&token, true).ok(),
            Err(TransferError::TokenMissing | TransferError::TokenUnknownOrExpired) => None,
            Err(err) => return Err(err),
        };

        if let Some(session) = request.session() {
            self.forget(session).await?;
        }

        match final_url {
            Some(location) => {
                tracing::debug!(
                    final_url = %without_query(&location),
                    "session transfer aborted at identity provider callback"
                );
                Ok(GatewayDecision::redirect(GatewayState::Blocked, location, Vec::new()))
            }
            None => Ok(self.blocked(request)),
        }
    }

    /// Token from the request parameter, falling back to the one remembered
    /// on the session.
    async fn token(&self, request: &TransferRequest) -> Result<TransferToken> {
        let raw = match request.query_param(PARAM_TOKEN) {
            Some(raw) => Some(raw),
            None => match request.session() {
                Some(session) => {
                    self.coordinator
                        .sessions()
                        .attribute(session, SESSION_TOKEN_ATTRIBUTE)
                        .await?
                }
                None => None,
            },
        };

        let raw = raw.ok_or(TransferError::TokenMissing)?;
        TransferToken::parse(&raw).ok_or(TransferError::TokenUnknownOrExpired)
    }

    async fn ensure_session(
        &self,
        request: &TransferRequest,
    ) -> Result<(HostSession, Vec<SessionCookie>)> {
        if let Some(session) = request.session() {
            return Ok((session.clone(), Vec::new()));
        }

        let session = self.coordinator.sessions().create().await?;
        let cookies = &self.coordinator.config().cookies;
        let cookie = SessionCookie::from_config(cookies, &cookies.session_cookie_name, &session.id);
        Ok((session, vec![cookie]))
    }

    async fn remember(&self, session: &HostSession, token: &TransferToken) -> Result<()> {
        self.coordinator
            .sessions()
            .set_attribute(session, SESSION_TOKEN_ATTRIBUTE, token.as_str())
            .await
    }

    async fn forget(&self, session: &HostSession) -> Result<()> {
        self.coordinator
            .sessions()
            .remove_attribute(session, SESSION_TOKEN_ATTRIBUTE)
            .await
    }

    /// Redirect to the configured fallback, or refuse with `403`.
    fn blocked(&self, request: &TransferRequest) -> GatewayDecision {
        let Some(template) = &self.config.blocked_redirect else {
            return GatewayDecision::reject(StatusCode::FORBIDDEN, "Forbidden");
        };

        let port = request.effective_port().to_string();
        let location = expand_template(
            template,
            &[
                ("scheme", request.scheme()),
                ("host", request.host()),
                ("port", port.as_str()),
                ("path", request.path()),
                ("query", request.query().unwrap_or_default()),
            ],
        );
        GatewayDecision::redirect(GatewayState::Blocked, location, Vec::new())
    }

    fn fail(&self, request: &TransferRequest, err: TransferError) -> GatewayDecision {
        if err == TransferError::Disabled {
            return GatewayDecision::pass_through();
        }

        if err.is_user_error() {
            tracing::warn!(
                host = %request.host(),
                path = %request.path(),
                error = %err,
                "session transfer request rejected"
            );
            return GatewayDecision::reject(err.status_code(), err.public_message());
        }

        if err.is_security_issue() {
            tracing::warn!(
                host = %request.host(),
                path = %request.path(),
                error = %err,
                "session transfer blocked"
            );
            return self.blocked(request);
        }

        tracing::error!(
            host = %request.host(),
            path = %request.path(),
            error = %err,
            "session transfer failed"
        );
        GatewayDecision::reject(err.status_code(), err.public_message())
    }
}

impl<S, P> std::fmt::Debug for AccessGatewayDispatcher<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGatewayDispatcher")
            .field("coordinator", &self.coordinator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

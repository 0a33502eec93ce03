//! Session Bridge demo host
//!
//! Serves any number of virtual hosts from one process. Requests under the
//! protected prefixes on a host other than the primary authentication host
//! are transferred through it; the trigger path stands in for the identity
//! provider login.
//!
//! # Usage
//!
//! ```bash
//! # Point auth.localhost and b.localhost at 127.0.0.1, then
//! SESSION_BRIDGE_AUTH_HOST_URL=http://auth.localhost:3000 \
//!     cargo run -p session-bridge-gateway
//!
//! # Open http://b.localhost:3000/private/page
//! ```

mod config;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use config::DemoConfig;
use session_bridge_auth::mocks::MockHostSessions;
use session_bridge_auth::{AccessGatewayDispatcher, TransferCoordinator};
use session_bridge_web::{AppError, TransferContext, WebResult, session_transfer_layer};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,session_bridge_auth=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DemoConfig::from_env()?;
    tracing::info!(
        bind = %config.bind,
        enabled = config.transfer.enabled,
        protected = ?config.gateway.protected_prefixes,
        "Configuration loaded"
    );

    let sessions = MockHostSessions::new();
    let state = DemoState {
        sessions: sessions.clone(),
        session_cookie: config.transfer.cookies.session_cookie_name.clone().into(),
    };
    let coordinator = TransferCoordinator::new(config.transfer, Arc::new(sessions))?;
    let trigger_uri = config.gateway.trigger_uri.clone();
    let dispatcher =
        AccessGatewayDispatcher::with_protected_prefixes(Arc::new(coordinator), config.gateway);

    let app = Router::new()
        .route("/", get(index))
        .route("/private", get(protected))
        .route("/private/*rest", get(protected))
        .route(&trigger_uri, get(login))
        .with_state(state)
        .layer(session_transfer_layer(Arc::new(dispatcher)))
        .layer(TraceLayer::new_for_http().make_span_with(request_span));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on {}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Span for the HTTP trace layer. Records the path only: transfer URLs carry
/// the token in their query string.
fn request_span(request: &Request<Body>) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

/// Shared handler state.
#[derive(Clone)]
struct DemoState {
    sessions: MockHostSessions,
    session_cookie: Arc<str>,
}

async fn index(TransferContext(request): TransferContext) -> String {
    format!("Public page on {}", request.host())
}

async fn protected(TransferContext(request): TransferContext) -> String {
    format!("Protected page {} on {}", request.path(), request.host())
}

/// Stand-in for the identity provider: logs the session in and returns to
/// the trigger path, where the gateway picks the transfer up again.
async fn login(
    State(state): State<DemoState>,
    TransferContext(request): TransferContext,
) -> WebResult<Response> {
    let cookie = request
        .cookie(&state.session_cookie)
        .ok_or_else(|| AppError::bad_request("No session to log in"))?;

    state
        .sessions
        .authenticate(cookie)
        .map_err(|_| AppError::bad_request("Unknown session"))?;
    tracing::info!(host = %request.host(), "demo login completed");

    Ok(Redirect::to(request.path()).into_response())
}

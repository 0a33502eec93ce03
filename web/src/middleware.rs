//! Axum middleware running the access gateway in front of the application.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use session_bridge_web::middleware::session_transfer_layer;
//!
//! let app = Router::new()
//!     .route("/private/report", get(report))
//!     .layer(session_transfer_layer(Arc::new(dispatcher)));
//! ```
//!
//! # Flow
//!
//! 1. **Adapt** the request into a `TransferRequest`
//! 2. **Dispatch** it through the `AccessGatewayDispatcher`, inside a
//!    `session_gateway` tracing span
//! 3. **Count** the decision (`session_gateway.decisions{state}`)
//! 4. **Answer** with a redirect or an error, or call the inner service

use crate::error::AppError;
use crate::extractors::transfer_request;
use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use session_bridge_auth::providers::{AccessPolicy, HostSessions};
use session_bridge_auth::{AccessGatewayDispatcher, GatewayAction, SessionCookie};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Metric counting gateway decisions, labelled by `state`.
pub const DECISIONS_METRIC: &str = "session_gateway.decisions";

/// Create a layer that routes every request through the access gateway.
#[must_use]
pub fn session_transfer_layer<S, P>(
    dispatcher: Arc<AccessGatewayDispatcher<S, P>>,
) -> SessionTransferLayer<S, P> {
    SessionTransferLayer { dispatcher }
}

/// Layer for the session transfer gateway.
pub struct SessionTransferLayer<S, P> {
    dispatcher: Arc<AccessGatewayDispatcher<S, P>>,
}

impl<S, P> Clone for SessionTransferLayer<S, P> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<I, S, P> Layer<I> for SessionTransferLayer<S, P> {
    type Service = SessionTransferMiddleware<I, S, P>;

    fn layer(&self, inner: I) -> Self::Service {
        SessionTransferMiddleware {
            inner,
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

/// Middleware service for the session transfer gateway.
pub struct SessionTransferMiddleware<I, S, P> {
    inner: I,
    dispatcher: Arc<AccessGatewayDispatcher<S, P>>,
}

impl<I: Clone, S, P> Clone for SessionTransferMiddleware<I, S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<I, S, P> Service<Request> for SessionTransferMiddleware<I, S, P>
where
    I: Service<Request, Response = Response> + Clone + Send + 'static,
    I::Future: Send + 'static,
    S: HostSessions + 'static,
    P: AccessPolicy + 'static,
{
    type Response = Response;
    type Error = I::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // The service that was driven to readiness handles this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let dispatcher = Arc::clone(&self.dispatcher);

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "session_gateway",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );
        let transfer = transfer_request(req.uri(), req.headers());

        Box::pin(
            async move {
                let decision = dispatcher.dispatch(transfer).await;
                metrics::counter!(DECISIONS_METRIC, "state" => decision.state.as_str())
                    .increment(1);

                match decision.action {
                    GatewayAction::PassThrough => inner.call(req).await,
                    GatewayAction::Redirect { location, cookies } => {
                        Ok(redirect_response(&location, &cookies))
                    }
                    GatewayAction::Reject { status, message } => {
                        Ok(AppError::from_status(status, message).into_response())
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// `302 Found` to `location`, setting `cookies`.
///
/// Transfer redirects carry a token in the `Location`; they are never
/// cacheable.
fn redirect_response(location: &str, cookies: &[SessionCookie]) -> Response {
    let Ok(location) = HeaderValue::from_str(location) else {
        return AppError::internal("Session transfer failed")
            .with_source(anyhow::anyhow!("redirect location is not a valid header value"))
            .into_response();
    };

    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, location);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_header_value()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(_) => {
                return AppError::internal("Session transfer failed")
                    .with_source(anyhow::anyhow!(
                        "cookie {} is not a valid header value",
                        cookie.name
                    ))
                    .into_response();
            }
        }
    }

    response
}

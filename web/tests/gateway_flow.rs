//! Session transfer through the Axum layer, driven request by request with
//! `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
    routing::get,
};
use session_bridge_auth::mocks::MockHostSessions;
use session_bridge_auth::{
    AccessGatewayDispatcher, GatewayConfig, TransferConfig, TransferCoordinator,
};
use session_bridge_web::session_transfer_layer;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;

fn app() -> (Router, MockHostSessions) {
    app_with(GatewayConfig::default().with_protected_prefix("/private"))
}

fn app_with(config: GatewayConfig) -> (Router, MockHostSessions) {
    let sessions = MockHostSessions::new();
    let coordinator = TransferCoordinator::new(
        TransferConfig::new("https://auth.example"),
        Arc::new(sessions.clone()),
    )
    .unwrap();
    let dispatcher =
        AccessGatewayDispatcher::with_protected_prefixes(Arc::new(coordinator), config);

    let router = Router::new()
        .route("/private/page", get(|| async { "secret" }))
        .route("/public", get(|| async { "public" }))
        .route("/bin/private/auth/session", get(|| async { "login form" }))
        .layer(session_transfer_layer(Arc::new(dispatcher)));
    (router, sessions)
}

/// Send a GET for an absolute URL the way a reverse proxy would forward it.
async fn get_url(app: &Router, url: &str, cookie: Option<&str>) -> Response {
    let url = Url::parse(url).unwrap();
    let path_and_query = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };

    let mut builder = Request::builder()
        .uri(path_and_query)
        .header(header::HOST, url.host_str().unwrap())
        .header("X-Forwarded-Proto", url.scheme());
    if let Some(value) = cookie {
        builder = builder.header(header::COOKIE, format!("JSESSIONID={value}"));
    }

    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn location(response: &Response) -> String {
    assert_eq!(response.status(), StatusCode::FOUND);
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect has a location")
        .to_str()
        .unwrap()
        .to_string()
}

fn session_cookie(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("JSESSIONID="))
        .and_then(|v| v.split(';').next())
        .expect("session cookie set")
        .to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_browser_round_trip() {
    let (app, sessions) = app();

    // Anonymous visit to a protected page on a virtual host.
    let response = get_url(&app, "https://b.example/private/page", None).await;
    let prepare = location(&response);
    assert!(prepare.starts_with("https://auth.example/bin/public/auth/session/prepare?token="));
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    // Primary host remembers the token.
    let response = get_url(&app, &prepare, None).await;
    let trigger = location(&response);
    let primary_session = session_cookie(&response);

    // The host's login runs on the trigger path.
    let response = get_url(&app, &trigger, Some(&primary_session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "login form");

    sessions.authenticate(&primary_session).unwrap();

    // Back from the identity provider: hand off to the target host.
    let response = get_url(
        &app,
        "https://auth.example/bin/private/auth/session",
        Some(&primary_session),
    )
    .await;
    let transfer = location(&response);
    assert!(transfer.starts_with("https://b.example/bin/public/auth/session/transfer?token="));

    // Target host installs the session and returns to the page.
    let response = get_url(&app, &transfer, None).await;
    assert_eq!(location(&response), "https://b.example/private/page");
    assert_eq!(session_cookie(&response), primary_session);

    let response = get_url(&app, "https://b.example/private/page", Some(&primary_session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "secret");
}

#[tokio::test]
async fn test_public_page_is_untouched() {
    let (app, _) = app();
    let response = get_url(&app, "https://b.example/public", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(response).await, "public");
}

#[tokio::test]
async fn test_primary_host_serves_its_own_protected_pages() {
    let (app, _) = app();
    let response = get_url(&app, "https://auth.example/private/page", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_replayed_transfer_is_rejected_as_json() {
    let (app, sessions) = app();

    let prepare = location(&get_url(&app, "https://b.example/private/page", None).await);
    let response = get_url(&app, &prepare, None).await;
    let primary_session = session_cookie(&response);
    sessions.authenticate(&primary_session).unwrap();
    let transfer = location(
        &get_url(
            &app,
            "https://auth.example/bin/private/auth/session",
            Some(&primary_session),
        )
        .await,
    );

    assert_eq!(get_url(&app, &transfer, None).await.status(), StatusCode::FOUND);

    let replay = get_url(&app, &transfer, None).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_text(replay).await).unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");
    assert_eq!(body["message"], "Session transfer token timed out or invalid");
}

#[tokio::test]
async fn test_transfer_at_foreign_host_is_forbidden() {
    let (app, sessions) = app();

    let prepare = location(&get_url(&app, "https://b.example/private/page", None).await);
    let response = get_url(&app, &prepare, None).await;
    let primary_session = session_cookie(&response);
    sessions.authenticate(&primary_session).unwrap();
    let transfer = location(
        &get_url(
            &app,
            "https://auth.example/bin/private/auth/session",
            Some(&primary_session),
        )
        .await,
    );

    let stolen = transfer.replace("https://b.example", "https://c.example");
    let response = get_url(&app, &stolen, None).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_guard_redirects_to_fallback() {
    let (app, _) = app_with(
        GatewayConfig::default()
            .with_protected_prefix("/private")
            .with_blocked_redirect("${scheme}://${host}/public"),
    );

    let response = get_url(&app, "https://b.example/bin/public/auth/saml", None).await;
    assert_eq!(location(&response), "https://b.example/public");
}

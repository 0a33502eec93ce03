//! Demo configuration from `SESSION_BRIDGE_*` environment variables.

use anyhow::{Context, Result};
use session_bridge_auth::{CookieConfig, GatewayConfig, TransferConfig};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Everything the demo host needs to start.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Coordinator settings.
    pub transfer: TransferConfig,
    /// Gateway endpoints and protected paths.
    pub gateway: GatewayConfig,
}

impl DemoConfig {
    /// Read the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let bind = parse_or("SESSION_BRIDGE_BIND", "0.0.0.0:3000".parse()?)?;

        let mut cookies = CookieConfig::default()
            .with_secure(parse_or("SESSION_BRIDGE_COOKIE_SECURE", false)?);
        if let Ok(domain) = env::var("SESSION_BRIDGE_COOKIE_DOMAIN") {
            cookies = cookies.with_domain(domain);
        }
        if let Ok(name) = env::var("SESSION_BRIDGE_SESSION_COOKIE") {
            cookies = cookies.with_session_cookie_name(name);
        }

        let transfer = TransferConfig {
            enabled: parse_or("SESSION_BRIDGE_ENABLED", true)?,
            authentication_host_url: Some(
                env::var("SESSION_BRIDGE_AUTH_HOST_URL")
                    .unwrap_or_else(|_| "http://auth.localhost:3000".to_string()),
            ),
            ..TransferConfig::default()
        }
        .with_login_ttl(parse_or(
            "SESSION_BRIDGE_LOGIN_TTL_MS",
            session_bridge_auth::constants::ttl::LOGIN_MILLIS,
        )?)
        .with_transfer_ttl(parse_or(
            "SESSION_BRIDGE_TRANSFER_TTL_MS",
            session_bridge_auth::constants::ttl::TRANSFER_MILLIS,
        )?)
        .with_cookies(cookies);

        let mut gateway = GatewayConfig::default();
        let prefixes = env::var("SESSION_BRIDGE_PROTECTED_PREFIXES")
            .unwrap_or_else(|_| "/private".to_string());
        for prefix in prefixes.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            gateway = gateway.with_protected_prefix(prefix);
        }
        if let Ok(template) = env::var("SESSION_BRIDGE_BLOCKED_REDIRECT") {
            gateway = gateway.with_blocked_redirect(template);
        }

        Ok(Self {
            bind,
            transfer,
            gateway,
        })
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name}={raw} is not valid")),
        Err(_) => Ok(default),
    }
}

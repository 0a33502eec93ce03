//! # Session Bridge
//!
//! Cross-host session transfer for deployments that serve many virtual
//! hosts behind one identity provider.
//!
//! The identity provider only redirects back to one **primary
//! authentication host**. A user who needs to log in on any other host is
//! bounced through the primary host, and the resulting session is installed
//! on the host they started from. No session identifier or transfer token
//! ever appears in a log line or a bookmarkable URL beyond the single
//! redirect that carries it.
//!
//! ## Architecture
//!
//! ```text
//! AccessGatewayDispatcher → TransferCoordinator → TokenStore
//! ```
//!
//! - [`TokenStore`]: ephemeral, single-use, TTL-bound tokens
//! - [`TransferCoordinator`]: the initiate / prepare / transfer phases
//! - [`AccessGatewayDispatcher`]: per-request routing into those phases
//!
//! The crate is framework-agnostic. The hosting application supplies its
//! session handling through [`providers::HostSessions`] and translates
//! [`TransferRequest`] / [`GatewayDecision`] values to and from HTTP.
//!
//! ## Example
//!
//! ```rust
//! use session_bridge_auth::*;
//! use session_bridge_auth::mocks::MockHostSessions;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let coordinator = TransferCoordinator::new(
//!     TransferConfig::new("https://auth.example.com"),
//!     Arc::new(MockHostSessions::new()),
//! )?;
//! let gateway = AccessGatewayDispatcher::with_protected_prefixes(
//!     Arc::new(coordinator),
//!     GatewayConfig::default().with_protected_prefix("/private"),
//! );
//!
//! let decision = gateway
//!     .dispatch(TransferRequest::new("https", "b.example.com", "/private/page"))
//!     .await;
//! assert_eq!(decision.state, GatewayState::Trigger);
//! # Ok::<(), TransferError>(())
//! # })?;
//! # Ok::<(), TransferError>(())
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod payload;
pub mod providers;
pub mod request;
pub mod stores;
pub mod utils;

// Mock implementations for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use config::{CookieConfig, GatewayConfig, TransferConfig};
pub use coordinator::{CompletedTransfer, TransferCoordinator};
pub use error::{Result, TransferError};
pub use gateway::{AccessGatewayDispatcher, GatewayAction, GatewayDecision, GatewayState};
pub use payload::TransferPayload;
pub use request::{SessionCookie, TransferRequest};
pub use stores::{TokenStore, TransferToken};

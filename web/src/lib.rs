//! Axum integration for cross-host session transfer.
//!
//! The core crate (`session-bridge-auth`) knows nothing about HTTP
//! frameworks. This crate is the imperative shell around it:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       SessionTransferLayer (Axum)       │  ← headers, cookies, redirects
//! │  - TransferRequest from request parts   │  ← tracing span, metrics
//! │  - GatewayDecision to response          │
//! ├─────────────────────────────────────────┤
//! │       AccessGatewayDispatcher           │
//! │  - protocol state machine               │  ← testable without a server
//! │  - TransferCoordinator, TokenStore      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use session_bridge_web::session_transfer_layer;
//!
//! let dispatcher = AccessGatewayDispatcher::with_protected_prefixes(coordinator, gateway_config);
//! let app = Router::new()
//!     .route("/private/report", get(report))
//!     .layer(session_transfer_layer(Arc::new(dispatcher)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{TransferContext, transfer_request};
pub use middleware::{DECISIONS_METRIC, SessionTransferLayer, session_transfer_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

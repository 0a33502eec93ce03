//! Collaborator interfaces.
//!
//! The transfer protocol needs two things from the hosting application that
//! it cannot own itself: the host's session handling and the decision which
//! paths require authentication. Both are traits so the core stays free of
//! any web framework and runs against mocks in tests.
//!
//! ```text
//! AccessGatewayDispatcher ──► TransferCoordinator ──► TokenStore
//!          │                          │
//!          ├── AccessPolicy           └── HostSessions
//!          └── HostSessions
//! ```

pub mod access;
pub mod session;

pub use access::{AccessPolicy, ProtectedPrefixes};
pub use session::{HostSession, HostSessions};

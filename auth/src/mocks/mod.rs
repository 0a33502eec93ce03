//! Mock collaborator implementations for testing.
//!
//! In-memory implementations of the provider traits for use in unit and
//! integration tests and in the demo host.

pub mod session;

pub use session::MockHostSessions;

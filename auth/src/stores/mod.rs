//! Token storage.
//!
//! The transfer protocol keeps its only server-side state here: payloads
//! addressed by short-lived random tokens.

pub mod token_store;

pub use token_store::{TokenStore, TransferToken};

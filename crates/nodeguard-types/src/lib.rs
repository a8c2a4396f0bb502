//! Shared types, adapter traits, and error types for NodeGuard.
//!
//! This crate holds the value types that flow between the admission-control
//! core, the ledger adapters and the config-sync / reporting collaborators.
//! Keeping them here lets adapter crates build without pulling in the core.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod error;
pub mod ledger_adapter;
pub mod online;
pub mod prelude;
pub mod types;

// vim: ts=4

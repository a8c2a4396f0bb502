//! NodeGuard is the admission-control and quota core of a multi-tenant proxy node.
//!
//! # Features
//!
//! - Per-user bandwidth shaping
//!     - token buckets shared by all connections of a user
//!     - node-wide speed cap
//! - Device limits
//!     - per node, by concurrently bound source IPs
//!     - across nodes, through a shared Redis ledger
//!     - trusted (alive) IPs bypass the limit
//! - Online-user reporting with traffic-based idle detection

// Re-export shared types and adapter traits from nodeguard-types
pub use nodeguard_types::error;
pub use nodeguard_types::ledger_adapter;
pub use nodeguard_types::online;
pub use nodeguard_types::types;

pub use nodeguard_core::limiter;
pub use nodeguard_core::{Admission, Limiter, RateBucket};

pub use nodeguard_ledger_adapter_redis as ledger_adapter_redis;

// Local modules
pub mod app;
pub mod config;
pub mod prelude;

// vim: ts=4

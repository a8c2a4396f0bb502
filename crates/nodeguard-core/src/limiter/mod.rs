//! Connection Admission Limiter
//!
//! Per-inbound admission control for proxy connections: local device
//! (concurrent IP) limits with an alive-IP allow-list, an optional cross-node
//! device ledger backed by a two-tier cache, per-user token-bucket rate
//! limiting, and per-cycle online-user reconciliation.

mod alive;
mod api;
mod bucket;
mod config;
mod device;
mod inbound;
mod ledger;
mod memory_store;
mod reconcile;
mod registry;

pub use alive::{AliveIpTable, AliveIps};
pub use api::{Admission, InboundStats, IpStatus};
pub use bucket::{determine_rate, RateBucket};
pub use config::{GlobalLimitConfig, RedisNetwork};
pub use inbound::InboundState;
pub use ledger::{ledger_key, ChainedLedgerStore, GlobalLedger};
pub use memory_store::MemoryLedgerStore;
pub use registry::{Limiter, RemoteStoreFn};

// vim: ts=4

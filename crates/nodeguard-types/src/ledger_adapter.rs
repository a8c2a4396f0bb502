//! Adapter trait for the tiers of the global device ledger.
//!
//! A store maps a ledger key to the set of IPs currently bound to one user
//! across all nodes. Implementations are expected to be cheap to call
//! concurrently; callers bound every call with their own timeout.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::prelude::*;
use crate::types::DeviceMap;

#[async_trait]
pub trait LedgerStore: Debug + Send + Sync {
	/// Short name used in log lines
	fn name(&self) -> &'static str;

	/// Reads the device map stored under `key`.
	///
	/// A missing or expired entry is `Ok(None)`; only transport or decode
	/// failures are errors.
	async fn get(&self, key: &str) -> NgResult<Option<DeviceMap>>;

	/// Stores `devices` under `key`, expiring after `ttl`
	async fn set(&self, key: &str, devices: &DeviceMap, ttl: Duration) -> NgResult<()>;
}

// vim: ts=4

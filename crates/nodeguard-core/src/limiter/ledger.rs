//! Global Device Ledger
//!
//! Cross-node device ceiling on top of a two-tier cache. The in-process tier
//! answers first; the distributed tier is the shared source of truth between
//! nodes and is written back into the local tier on a hit.
//!
//! The ledger never blocks a connection because of the cache: lookups are
//! bounded by the configured timeout and any failure counts as "allow".
//! Writes are spawned in the background and not awaited by the caller.
//! There is no cross-node locking; concurrent writers race and the last
//! write wins until the entry expires.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use nodeguard_types::ledger_adapter::LedgerStore;
use nodeguard_types::types::DeviceMap;

use super::config::GlobalLimitConfig;
use super::memory_store::MemoryLedgerStore;
use crate::prelude::*;

/// Builds the ledger key for a user.
///
/// The inbound tag is replaced by the configured device limit, so the same
/// user shares one entry across inbounds and nodes as long as the limit
/// matches, and a limit change starts a fresh entry.
pub fn ledger_key(user: &UserKey, device_limit: u32) -> String {
	format!("{}|{}|{}", device_limit, user.identifier, user.uid)
}

/// Local tier in front of an optional remote tier
#[derive(Debug)]
pub struct ChainedLedgerStore {
	local: Arc<MemoryLedgerStore>,
	remote: Option<Arc<dyn LedgerStore>>,
	/// TTL applied when a remote hit is written back locally
	ttl: Duration,
}

impl ChainedLedgerStore {
	pub fn new(
		local: Arc<MemoryLedgerStore>,
		remote: Option<Arc<dyn LedgerStore>>,
		ttl: Duration,
	) -> Self {
		Self { local, remote, ttl }
	}

	pub fn local(&self) -> &Arc<MemoryLedgerStore> {
		&self.local
	}
}

#[async_trait]
impl LedgerStore for ChainedLedgerStore {
	fn name(&self) -> &'static str {
		"chain"
	}

	async fn get(&self, key: &str) -> NgResult<Option<DeviceMap>> {
		if let Some(devices) = self.local.get(key).await? {
			return Ok(Some(devices));
		}
		let Some(remote) = &self.remote else {
			return Ok(None);
		};

		let devices = remote.get(key).await?;
		if let Some(devices) = &devices {
			self.local.set(key, devices, self.ttl).await?;
		}
		Ok(devices)
	}

	async fn set(&self, key: &str, devices: &DeviceMap, ttl: Duration) -> NgResult<()> {
		self.local.set(key, devices, ttl).await?;
		if let Some(remote) = &self.remote {
			remote.set(key, devices, ttl).await?;
		}
		Ok(())
	}
}

pub struct GlobalLedger {
	store: Arc<dyn LedgerStore>,
	local: Option<Arc<MemoryLedgerStore>>,
	expiry: Duration,
	timeout: Duration,
}

impl GlobalLedger {
	/// Ledger over the two-tier chain built from `config`
	pub fn new(config: &GlobalLimitConfig, remote: Option<Arc<dyn LedgerStore>>) -> Self {
		let local = Arc::new(MemoryLedgerStore::new(config.local_capacity));
		let chain =
			ChainedLedgerStore::new(local.clone(), remote, config.expiry_duration());
		Self {
			store: Arc::new(chain),
			local: Some(local),
			expiry: config.expiry_duration(),
			timeout: config.timeout_duration(),
		}
	}

	/// Ledger over an arbitrary store
	pub fn with_store(config: &GlobalLimitConfig, store: Arc<dyn LedgerStore>) -> Self {
		Self {
			store,
			local: None,
			expiry: config.expiry_duration(),
			timeout: config.timeout_duration(),
		}
	}

	/// Checks `ip` against the user's cross-node device entry.
	///
	/// Returns true if the connection must be rejected. A miss or any cache
	/// failure admits the connection. New IPs are merged into the entry and
	/// written back in the background.
	pub async fn check(&self, user: &UserKey, uid: Uid, ip: IpAddr, device_limit: u32) -> bool {
		let key = ledger_key(user, device_limit);
		let ip = ip.to_string();

		let mut devices = match tokio::time::timeout(self.timeout, self.store.get(&key)).await {
			Ok(Ok(Some(devices))) => devices,
			Ok(Ok(None)) => {
				self.push(key, DeviceMap::from([(ip, uid)]));
				return false;
			}
			Ok(Err(err)) => {
				warn!("cache service ({}): lookup of {} failed: {}", self.store.name(), key, err);
				return false;
			}
			Err(_) => {
				warn!("cache service ({}): lookup of {} timed out", self.store.name(), key);
				return false;
			}
		};

		if device_limit > 0 && devices.len() > device_limit as usize {
			debug!("{} rejected by global ledger: {} devices over limit {}", user, devices.len(), device_limit);
			return true;
		}

		if !devices.contains_key(&ip) {
			devices.insert(ip, uid);
			self.push(key, devices);
		}

		false
	}

	/// Best-effort background write; the caller never waits for it
	fn push(&self, key: String, devices: DeviceMap) {
		let store = self.store.clone();
		let (expiry, timeout) = (self.expiry, self.timeout);
		tokio::spawn(async move {
			match tokio::time::timeout(timeout, store.set(&key, &devices, expiry)).await {
				Ok(Ok(())) => trace!("Ledger entry {} stored ({} devices)", key, devices.len()),
				Ok(Err(err)) => warn!("cache service ({}): store of {} failed: {}", store.name(), key, err),
				Err(_) => warn!("cache service ({}): store of {} timed out", store.name(), key),
			}
		});
	}

	/// Direct read of the entry, bounded by the timeout
	pub async fn devices(&self, user: &UserKey, device_limit: u32) -> NgResult<Option<DeviceMap>> {
		let key = ledger_key(user, device_limit);
		tokio::time::timeout(self.timeout, self.store.get(&key)).await?
	}

	/// Expires stale entries of the local tier
	pub fn purge_expired(&self) -> usize {
		self.local.as_ref().map_or(0, |local| local.purge_expired())
	}

	pub fn local_entries(&self) -> usize {
		self.local.as_ref().map_or(0, |local| local.len())
	}
}


// vim: ts=4

//! In-process ledger tier
//!
//! LRU-bounded map with per-entry expiry. Serves as the fast tier in front of
//! the distributed cache and as the only tier when no remote store is wired.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use nodeguard_types::ledger_adapter::LedgerStore;
use nodeguard_types::types::DeviceMap;

use crate::prelude::*;

#[derive(Debug)]
struct Entry {
	devices: DeviceMap,
	expires_at: Instant,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		now >= self.expires_at
	}
}

#[derive(Debug)]
pub struct MemoryLedgerStore {
	entries: Mutex<LruCache<Box<str>, Entry>>,
}

impl MemoryLedgerStore {
	pub fn new(capacity: usize) -> Self {
		const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100_000) {
			Some(v) => v,
			None => unreachable!(),
		};
		let cap = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
		Self { entries: Mutex::new(LruCache::new(cap)) }
	}

	/// Drops every expired entry, returns how many were removed
	pub fn purge_expired(&self) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		let expired: Vec<Box<str>> = entries
			.iter()
			.filter(|(_, entry)| entry.is_expired(now))
			.map(|(key, _)| key.clone())
			.collect();
		for key in &expired {
			entries.pop(key);
		}
		expired.len()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
	fn name(&self) -> &'static str {
		"memory"
	}

	async fn get(&self, key: &str) -> NgResult<Option<DeviceMap>> {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		let expired = match entries.get(key) {
			Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.devices.clone())),
			Some(_) => true,
			None => false,
		};
		if expired {
			entries.pop(key);
		}
		Ok(None)
	}

	async fn set(&self, key: &str, devices: &DeviceMap, ttl: Duration) -> NgResult<()> {
		let entry = Entry { devices: devices.clone(), expires_at: Instant::now() + ttl };
		self.entries.lock().put(key.into(), entry);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn devices(ips: &[&str]) -> DeviceMap {
		ips.iter().map(|ip| ((*ip).to_string(), Uid(1))).collect()
	}

	#[tokio::test]
	async fn test_set_get() {
		let store = MemoryLedgerStore::new(10);
		assert_eq!(store.get("k").await.unwrap(), None);

		store.set("k", &devices(&["1.1.1.1"]), Duration::from_secs(60)).await.unwrap();
		assert_eq!(store.get("k").await.unwrap(), Some(devices(&["1.1.1.1"])));
	}

	#[tokio::test]
	async fn test_expiry() {
		let store = MemoryLedgerStore::new(10);
		store.set("k", &devices(&["1.1.1.1"]), Duration::ZERO).await.unwrap();
		assert_eq!(store.get("k").await.unwrap(), None);
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn test_purge_expired() {
		let store = MemoryLedgerStore::new(10);
		store.set("old", &devices(&["1.1.1.1"]), Duration::ZERO).await.unwrap();
		store.set("new", &devices(&["2.2.2.2"]), Duration::from_secs(60)).await.unwrap();

		assert_eq!(store.purge_expired(), 1);
		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn test_capacity_bound() {
		let store = MemoryLedgerStore::new(2);
		for key in ["a", "b", "c"] {
			store.set(key, &devices(&["1.1.1.1"]), Duration::from_secs(60)).await.unwrap();
		}
		assert_eq!(store.len(), 2);
		assert_eq!(store.get("a").await.unwrap(), None);
	}
}

// vim: ts=4

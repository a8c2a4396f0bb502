//! Per-inbound limiter state.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::api::InboundStats;
use super::bucket::{determine_rate, BucketTable, RateBucket};
use super::device::DeviceTracker;
use super::ledger::GlobalLedger;
use crate::prelude::*;

/// Everything the limiter keeps for one inbound.
///
/// Built fresh on every add and swapped into the registry as a whole;
/// holders of an old `Arc` keep a consistent view until they drop it.
pub struct InboundState {
	pub(crate) tag: Box<str>,
	pub(crate) node_speed_limit: u64,
	pub(crate) users: DashMap<UserKey, UserQuota>,
	pub(crate) buckets: BucketTable,
	pub(crate) devices: DeviceTracker,
	/// UID -> active IPs reported in the last cycle
	pub(crate) last_online: RwLock<Arc<HashMap<Uid, BTreeSet<IpAddr>>>>,
	/// UID -> cumulative traffic seen at the last cycle
	pub(crate) last_traffic: RwLock<Arc<HashMap<Uid, u64>>>,
	/// Serializes reporting cycles of this inbound
	pub(crate) cycle_lock: Mutex<()>,
	pub(crate) ledger: Option<GlobalLedger>,
}

impl InboundState {
	pub(crate) fn new(
		tag: &str,
		node_speed_limit: u64,
		users: &[UserInfo],
		ledger: Option<GlobalLedger>,
	) -> Self {
		let state = Self {
			tag: tag.into(),
			node_speed_limit,
			users: DashMap::with_capacity(users.len()),
			buckets: BucketTable::default(),
			devices: DeviceTracker::default(),
			last_online: RwLock::new(Arc::default()),
			last_traffic: RwLock::new(Arc::default()),
			cycle_lock: Mutex::new(()),
			ledger,
		};
		for user in users {
			state.users.insert(user.key(tag), user.quota());
		}
		state
	}

	pub fn tag(&self) -> &str {
		&self.tag
	}

	pub fn node_speed_limit(&self) -> u64 {
		self.node_speed_limit
	}

	/// Quota of `user`; unknown users are unlimited
	pub fn quota(&self, user: &UserKey) -> UserQuota {
		self.users
			.get(user)
			.map(|q| *q.value())
			.unwrap_or(UserQuota { uid: user.uid, ..UserQuota::default() })
	}

	/// Refreshes quotas and retunes live buckets to the new effective rate
	pub(crate) fn update_users(&self, users: &[UserInfo]) {
		for user in users {
			let key = user.key(&self.tag);
			let quota = user.quota();
			self.users.insert(key.clone(), quota);
			self.buckets.adjust(&key, determine_rate(self.node_speed_limit, quota.speed_limit));
		}
	}

	/// Drops the per-cycle traffic baseline
	pub(crate) fn reset_traffic(&self) {
		*self.last_traffic.write() = Arc::default();
	}

	/// IPs currently bound to `user` on this node
	pub fn online_ips(&self, user: &UserKey) -> Vec<IpAddr> {
		self.devices.ips_of(user)
	}

	pub fn bucket(&self, user: &UserKey) -> Option<Arc<RateBucket>> {
		self.buckets.get(user)
	}

	pub fn ledger(&self) -> Option<&GlobalLedger> {
		self.ledger.as_ref()
	}

	pub fn stats(&self) -> InboundStats {
		InboundStats {
			users: self.users.len(),
			buckets: self.buckets.len(),
			online_users: self.devices.online_users(),
			online_devices: self.devices.online_devices(),
			ip_statuses: self.devices.allow_status_len(),
			ledger_entries: self.ledger.as_ref().map_or(0, GlobalLedger::local_entries),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn users() -> Vec<UserInfo> {
		vec![
			UserInfo { uid: Uid(1), identifier: "a@panel.user".into(), speed_limit: 100, device_limit: 1 },
			UserInfo { uid: Uid(2), identifier: "b@panel.user".into(), speed_limit: 0, device_limit: 0 },
		]
	}

	#[test]
	fn test_quota_lookup() {
		let state = InboundState::new("in-1", 0, &users(), None);
		let a = UserKey::new("in-1", "a@panel.user", Uid(1));
		assert_eq!(state.quota(&a).speed_limit, 100);
		assert_eq!(state.quota(&a).device_limit, 1);

		// Same user on another inbound is unknown here
		let other = UserKey::new("in-2", "a@panel.user", Uid(1));
		assert_eq!(state.quota(&other), UserQuota { uid: Uid(1), speed_limit: 0, device_limit: 0 });
	}

	#[test]
	fn test_update_retunes_buckets() {
		let state = InboundState::new("in-1", 500, &users(), None);
		let a = UserKey::new("in-1", "a@panel.user", Uid(1));
		let bucket = state.buckets.get_or_create(&a, 100);

		let mut updated = users();
		updated[0].speed_limit = 1000;
		state.update_users(&updated);
		// Node cap is now the tighter one
		assert_eq!(bucket.rate(), 500);
		assert_eq!(state.quota(&a).speed_limit, 1000);
	}

	#[test]
	fn test_stats() {
		let state = InboundState::new("in-1", 0, &users(), None);
		let stats = state.stats();
		assert_eq!(stats.users, 2);
		assert_eq!(stats.buckets, 0);
		assert_eq!(stats.online_users, 0);
	}
}

// vim: ts=4

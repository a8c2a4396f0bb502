//! Local Device Tracker
//!
//! Tracks which IPs are bound to which user on this node and enforces the
//! per-user device ceiling for connection-oriented traffic.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::api::IpStatus;
use crate::prelude::*;

/// IPs currently bound to one user
pub(crate) type UserIps = Arc<DashMap<IpAddr, Uid>>;

#[derive(Default)]
pub(crate) struct DeviceTracker {
	/// User -> bound IPs
	online: DashMap<UserKey, UserIps>,
	/// Last classification seen per IP, reused by the reconciler
	allow_status: DashMap<IpAddr, IpStatus>,
}

impl DeviceTracker {
	/// Registers `ip` for `user` unless that would exceed the device limit.
	///
	/// Returns false if the connection must be refused; in that case no IP
	/// is left registered.
	pub fn admit(&self, user: &UserKey, quota: &UserQuota, ip: IpAddr, alive_ips: &[IpAddr]) -> bool {
		let status = IpStatus::classify(ip, alive_ips);
		self.allow_status.insert(ip, status);

		let device_limit = quota.device_limit as usize;
		if status == IpStatus::Unpinned && device_limit > 0 && device_limit <= alive_ips.len() {
			debug!("{} rejected: {} pinned IPs already fill device limit {}", user, alive_ips.len(), device_limit);
			return false;
		}

		let ips = match self.online.entry(user.clone()) {
			Entry::Occupied(entry) => entry.get().clone(),
			Entry::Vacant(entry) => {
				let ips = DashMap::new();
				ips.insert(ip, quota.uid);
				entry.insert(Arc::new(ips));
				return true;
			}
		};

		if ips.insert(ip, quota.uid).is_none() {
			let count = ips.len() + alive_ips.len();
			if status != IpStatus::Pinned && device_limit > 0 && device_limit < count {
				ips.remove(&ip);
				debug!("{} rejected from {}: {} devices over limit {}", user, ip, count, device_limit);
				return false;
			}
		}

		true
	}

	pub fn is_online(&self, user: &UserKey) -> bool {
		self.online.contains_key(user)
	}

	pub fn allow_status(&self, ip: &IpAddr) -> Option<IpStatus> {
		self.allow_status.get(ip).map(|s| *s.value())
	}

	/// Forgets the status of every IP no longer bound to any user,
	/// returns how many were dropped
	pub fn prune_allow_status(&self) -> usize {
		let mut bound = HashSet::new();
		for ips in self.online.iter() {
			bound.extend(ips.value().iter().map(|device| *device.key()));
		}
		let before = self.allow_status.len();
		self.allow_status.retain(|ip, _| bound.contains(ip));
		before.saturating_sub(self.allow_status.len())
	}

	pub fn allow_status_len(&self) -> usize {
		self.allow_status.len()
	}

	/// Copies out the current user -> IPs bindings
	pub fn snapshot(&self) -> Vec<(UserKey, UserIps)> {
		self.online.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
	}

	/// Forgets all IPs bound to `user`
	pub fn purge(&self, user: &UserKey) {
		self.online.remove(user);
	}

	pub fn online_users(&self) -> usize {
		self.online.len()
	}

	pub fn online_devices(&self) -> usize {
		self.online.iter().map(|e| e.value().len()).sum()
	}

	pub fn ips_of(&self, user: &UserKey) -> Vec<IpAddr> {
		self.online
			.get(user)
			.map(|ips| ips.iter().map(|e| *e.key()).collect())
			.unwrap_or_default()
	}
}


// vim: ts=4

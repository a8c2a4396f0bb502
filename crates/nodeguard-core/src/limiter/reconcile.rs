//! Online/Traffic Reconciler
//!
//! Once per reporting cycle, turns the bound-IP table and the cumulative
//! traffic counters into the online-user snapshot for the panel.
//!
//! The previous snapshot and traffic baseline are read once at the start and
//! the new ones are published by a pointer swap at the end, so inserts from
//! connection setup are never lost to the swap. A connection admitted while
//! a user is being purged may still miss this cycle's report; it shows up
//! again on the next one.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use nodeguard_types::online::OnlineUser;

use super::api::IpStatus;
use super::inbound::InboundState;
use crate::prelude::*;

/// Result of one reporting cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CycleReport {
	pub users: Vec<OnlineUser>,
	/// True if any reported user's set of active IPs differs from the
	/// previous cycle
	pub changed: bool,
}

impl InboundState {
	/// Runs one reporting cycle.
	///
	/// `traffic` holds cumulative per-UID byte counters; a user whose growth
	/// since the last cycle is at most `threshold` is reported with no IP and
	/// has its bindings cleared. Users whose IP is off their alive-IP list are
	/// not reported and are cleared as well.
	pub(crate) fn reconcile(&self, traffic: &HashMap<Uid, u64>, threshold: u64) -> CycleReport {
		let _cycle = self.cycle_lock.lock();

		// Buckets of users who went offline last cycle
		self.buckets.retain(|user| self.devices.is_online(user));

		let prev_traffic = self.last_traffic.read().clone();
		let prev_online = self.last_online.read().clone();

		let mut next_traffic = HashMap::with_capacity(prev_traffic.len());
		let mut next_online: HashMap<Uid, BTreeSet<IpAddr>> = HashMap::with_capacity(prev_online.len());
		let mut report = CycleReport::default();
		let mut stale = Vec::new();

		for (user, ips) in self.devices.snapshot() {
			let mut status = IpStatus::NoList;
			let mut delta = 0;

			for device in ips.iter() {
				let (ip, uid) = (*device.key(), *device.value());
				if let Some(s) = self.devices.allow_status(&ip) {
					status = s;
				}

				let current = traffic.get(&uid).copied().unwrap_or(0);
				next_traffic.insert(uid, current);
				delta = current.saturating_sub(prev_traffic.get(&uid).copied().unwrap_or(0));

				if status != IpStatus::Unpinned {
					let reported = (delta > threshold).then_some(ip);
					report.users.push(OnlineUser { uid, ip: reported });
					next_online.entry(uid).or_default().extend(reported);
				}
			}

			if status == IpStatus::Unpinned || delta <= threshold {
				stale.push(user);
			}
		}

		// Users seen idle both times compare as two empty sets
		report.changed = next_online
			.iter()
			.any(|(uid, active)| prev_online.get(uid).map_or(!active.is_empty(), |prev| prev != active));

		*self.last_traffic.write() = Arc::new(next_traffic);
		*self.last_online.write() = Arc::new(next_online);

		for user in &stale {
			self.devices.purge(user);
		}
		let pruned = self.devices.prune_allow_status();

		if let Some(ledger) = &self.ledger {
			let purged = ledger.purge_expired();
			if purged > 0 {
				trace!("[{}] expired {} local ledger entries", self.tag, purged);
			}
		}

		debug!(
			"[{}] cycle: {} reported, {} cleared, {} IP statuses pruned, changed={}",
			self.tag,
			report.users.len(),
			stale.len(),
			pruned,
			report.changed
		);
		report
	}
}


// vim: ts=4

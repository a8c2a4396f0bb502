//! Alive-IP Table
//!
//! Per-user pinned IPs supplied by the panel. The table is an immutable
//! snapshot replaced wholesale on refresh; readers clone the `Arc` and never
//! block a refresh for longer than a pointer swap.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::prelude::*;

/// Snapshot: UID -> pinned IPs
pub type AliveIps = Arc<HashMap<Uid, Arc<[IpAddr]>>>;

#[derive(Default)]
pub struct AliveIpTable {
	table: RwLock<AliveIps>,
}

impl AliveIpTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> AliveIps {
		self.table.read().clone()
	}

	/// Pinned IPs of one user, `None` if the user has no list
	pub fn lookup(&self, uid: Uid) -> Option<Arc<[IpAddr]>> {
		self.table.read().get(&uid).cloned()
	}

	/// Publishes a new table.
	///
	/// Users with an empty list are dropped. Returns false if the new table
	/// equals the current one, in which case nothing is swapped.
	pub fn replace(&self, table: HashMap<Uid, Vec<IpAddr>>) -> bool {
		let next: HashMap<Uid, Arc<[IpAddr]>> = table
			.into_iter()
			.filter(|(_, ips)| !ips.is_empty())
			.map(|(uid, ips)| (uid, Arc::from(ips)))
			.collect();

		let mut current = self.table.write();
		if **current == next {
			return false;
		}
		debug!("Alive-IP table replaced: {} users with pinned IPs", next.len());
		*current = Arc::new(next);
		true
	}

	pub fn len(&self) -> usize {
		self.table.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.table.read().is_empty()
	}
}


// vim: ts=4

//! Online-user snapshot types exchanged with the reporting collaborator.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use crate::types::Uid;

/// One reported device of a user for the current cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OnlineUser {
	pub uid: Uid,
	/// `None` when the user is still bound but was idle this cycle
	pub ip: Option<IpAddr>,
}

/// Reporting payload grouped per user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OnlineReport {
	/// UID -> reported IPs, idle devices as empty strings
	pub devices: BTreeMap<Uid, Vec<String>>,
	/// UID -> number of active (non-empty) devices
	#[serde(skip)]
	pub online_counts: HashMap<Uid, usize>,
}

impl OnlineReport {
	pub fn from_users(users: &[OnlineUser]) -> Self {
		let mut report = Self::default();
		for user in users {
			let ip = user.ip.map(|ip| ip.to_string()).unwrap_or_default();
			if user.ip.is_some() {
				*report.online_counts.entry(user.uid).or_insert(0) += 1;
			}
			report.devices.entry(user.uid).or_default().push(ip);
		}
		report
	}

	pub fn is_empty(&self) -> bool {
		self.devices.is_empty()
	}
}


// vim: ts=4

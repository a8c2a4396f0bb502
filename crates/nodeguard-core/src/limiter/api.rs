//! Limiter API Types
//!
//! Outcome and classification types returned to the data plane and the
//! reporting side.

use std::net::IpAddr;
use std::sync::Arc;

use super::bucket::RateBucket;

/// Result of an admission check for a new connection
#[derive(Debug, Clone)]
pub enum Admission {
	/// Admitted; the connection must respect this bucket
	Limited(Arc<RateBucket>),
	/// Admitted without throttling (no effective rate configured)
	Unlimited,
	/// Device limit exceeded, locally or globally
	Rejected,
}

impl Admission {
	pub fn is_rejected(&self) -> bool {
		matches!(self, Admission::Rejected)
	}

	pub fn is_rate_limited(&self) -> bool {
		matches!(self, Admission::Limited(_))
	}

	pub fn bucket(&self) -> Option<&Arc<RateBucket>> {
		match self {
			Admission::Limited(bucket) => Some(bucket),
			_ => None,
		}
	}

	/// Splits into `(bucket, is_rate_limited, is_rejected)`
	pub fn into_parts(self) -> (Option<Arc<RateBucket>>, bool, bool) {
		match self {
			Admission::Limited(bucket) => (Some(bucket), true, false),
			Admission::Unlimited => (None, false, false),
			Admission::Rejected => (None, false, true),
		}
	}
}

/// Classification of a connecting IP against the user's alive-IP list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpStatus {
	/// The user has no alive-IP list
	NoList = 0,
	/// The IP is on the list and is never counted against the limit
	Pinned = 1,
	/// The user has a list but this IP is not on it
	Unpinned = 2,
}

impl IpStatus {
	pub fn classify(ip: IpAddr, alive_ips: &[IpAddr]) -> Self {
		if alive_ips.is_empty() {
			IpStatus::NoList
		} else if alive_ips.contains(&ip) {
			IpStatus::Pinned
		} else {
			IpStatus::Unpinned
		}
	}
}

/// Statistics about one inbound's limiter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundStats {
	/// Users in the quota directory
	pub users: usize,
	/// Live rate buckets
	pub buckets: usize,
	/// Users with at least one bound IP
	pub online_users: usize,
	/// Bound (user, IP) pairs
	pub online_devices: usize,
	/// Cached IP classifications kept for the reporting cycle
	pub ip_statuses: usize,
	/// Entries held by the local ledger tier (0 without global limiting)
	pub ledger_entries: usize,
}


// vim: ts=4

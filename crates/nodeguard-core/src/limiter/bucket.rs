//! Rate Bucket Registry
//!
//! One token bucket per user and inbound, built on the governor crate's GCRA
//! limiter. Capacity and refill rate are both the effective rate in bytes,
//! i.e. one second of burst.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::RwLock;

use crate::prelude::*;

/// Resolves the effective byte rate from the node-wide and per-user caps.
///
/// Zero means unlimited for either input; when both caps are set the more
/// restrictive one wins.
pub fn determine_rate(node_limit: u64, user_limit: u64) -> u64 {
	match (node_limit, user_limit) {
		(0, 0) => 0,
		(0, limit) | (limit, 0) => limit,
		(node, user) => node.min(user),
	}
}

/// Rate and limiter are swapped together so readers never pair a new rate
/// with an old limiter.
#[derive(Clone)]
struct BucketState {
	rate: u64,
	limiter: Arc<DefaultDirectRateLimiter>,
}

impl BucketState {
	fn new(rate: u64) -> Self {
		let cells = cells_for(rate);
		let quota = Quota::per_second(cells).allow_burst(cells);
		Self { rate, limiter: Arc::new(RateLimiter::direct(quota)) }
	}

	fn capacity(&self) -> u64 {
		u64::from(cells_for(self.rate).get())
	}

	/// Time the bucket needs to refill completely, at most one second.
	/// Empties the bucket.
	fn drain(&self) -> Duration {
		match self.limiter.check_n(cells_for(self.rate)) {
			Ok(Ok(())) | Err(_) => Duration::ZERO,
			Ok(Err(not_until)) => {
				not_until.wait_time_from(DefaultClock::default().now()).min(Duration::from_secs(1))
			}
		}
	}

	/// New state for `rate` missing the same share of its burst as a
	/// bucket that needs `refill` to become full
	fn with_refill(rate: u64, refill: Duration) -> Self {
		let state = Self::new(rate);
		let cells = u128::from(cells_for(rate).get());
		let missing = (cells * refill.as_nanos() / 1_000_000_000) as u32;
		if let Some(n) = NonZeroU32::new(missing) {
			let _ = state.limiter.check_n(n);
		}
		state
	}
}

/// Governor counts cells in u32; rates above that saturate.
fn cells_for(rate: u64) -> NonZeroU32 {
	NonZeroU32::new(u32::try_from(rate).unwrap_or(u32::MAX)).unwrap_or(NonZeroU32::MIN)
}

/// Byte-granularity token bucket shared by all connections of one user
pub struct RateBucket {
	state: RwLock<BucketState>,
}

impl std::fmt::Debug for RateBucket {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RateBucket").field("rate", &self.rate()).finish()
	}
}

impl RateBucket {
	/// Create a bucket for `rate` bytes/s (burst = rate)
	pub fn new(rate: u64) -> Self {
		Self { state: RwLock::new(BucketState::new(rate)) }
	}

	/// Current refill rate in bytes/s
	pub fn rate(&self) -> u64 {
		self.state.read().rate
	}

	/// Maximum burst in bytes
	pub fn capacity(&self) -> u64 {
		self.state.read().capacity()
	}

	/// Adjusts rate and burst in place.
	///
	/// Connections holding this bucket observe the new limit on their next
	/// check. The fill level carries over as a share of the burst, so a
	/// drained bucket stays drained at the new rate.
	pub fn set_rate(&self, rate: u64) {
		let mut state = self.state.write();
		if state.rate != rate {
			let refill = state.drain();
			*state = BucketState::with_refill(rate, refill);
		}
	}

	/// Tries to take `bytes` tokens without waiting.
	///
	/// Returns the time until the request could succeed when the bucket is
	/// short. Requests above the capacity are charged as a full bucket.
	pub fn check_n(&self, bytes: u64) -> Result<(), Duration> {
		let state = self.state.read().clone();
		let Some(n) = NonZeroU32::new(bytes.min(state.capacity()) as u32) else {
			return Ok(());
		};

		match state.limiter.check_n(n) {
			Ok(Ok(())) => Ok(()),
			Ok(Err(not_until)) => Err(not_until.wait_time_from(DefaultClock::default().now())),
			// n never exceeds the burst size
			Err(_) => Ok(()),
		}
	}

	/// Waits until `bytes` tokens have been taken.
	///
	/// Large requests are taken in capacity-sized chunks; a rate change
	/// between chunks applies to the remaining ones.
	pub async fn until_n_ready(&self, bytes: u64) {
		let mut remaining = bytes;
		while remaining > 0 {
			let state = self.state.read().clone();
			let chunk = remaining.min(state.capacity());
			let Some(n) = NonZeroU32::new(chunk as u32) else {
				break;
			};
			if state.limiter.until_n_ready(n).await.is_err() {
				warn!("Rate bucket chunk of {} bytes exceeds capacity", chunk);
				break;
			}
			remaining -= chunk;
		}
	}
}

/// Bucket table of one inbound: user -> bucket
#[derive(Default)]
pub(crate) struct BucketTable {
	buckets: DashMap<UserKey, Arc<RateBucket>>,
}

impl BucketTable {
	/// Looks up the user's bucket, creating it with `rate` on first use.
	///
	/// Concurrent callers for the same user all receive the same instance.
	pub fn get_or_create(&self, user: &UserKey, rate: u64) -> Arc<RateBucket> {
		if let Some(bucket) = self.buckets.get(user) {
			return bucket.value().clone();
		}
		self.buckets
			.entry(user.clone())
			.or_insert_with(|| {
				debug!("Creating rate bucket for {} at {} B/s", user, rate);
				Arc::new(RateBucket::new(rate))
			})
			.value()
			.clone()
	}

	/// Applies a new effective rate to an existing bucket.
	///
	/// An unlimited rate removes the bucket; users without a bucket are left
	/// alone and pick up the new rate on their next connection.
	pub fn adjust(&self, user: &UserKey, rate: u64) {
		if rate == 0 {
			self.buckets.remove(user);
		} else if let Some(bucket) = self.buckets.get(user) {
			bucket.set_rate(rate);
		}
	}

	/// Drops buckets for which `keep` returns false
	pub fn retain(&self, mut keep: impl FnMut(&UserKey) -> bool) {
		self.buckets.retain(|user, _| keep(user));
	}

	pub fn get(&self, user: &UserKey) -> Option<Arc<RateBucket>> {
		self.buckets.get(user).map(|b| b.value().clone())
	}

	pub fn len(&self) -> usize {
		self.buckets.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn alice() -> UserKey {
		UserKey::new("in-1", "alice@panel.user", Uid(1))
	}

	#[test]
	fn test_determine_rate() {
		assert_eq!(determine_rate(0, 0), 0);
		assert_eq!(determine_rate(0, 100), 100);
		assert_eq!(determine_rate(50, 0), 50);
		assert_eq!(determine_rate(30, 80), 30);
		assert_eq!(determine_rate(80, 30), 30);
		assert_eq!(determine_rate(40, 40), 40);
	}

	#[test]
	fn test_determine_rate_exhaustive_small() {
		for a in 0..20u64 {
			for b in 0..20u64 {
				let rate = determine_rate(a, b);
				assert_eq!(rate == 0, a == 0 && b == 0);
				if a != 0 && b != 0 {
					assert_eq!(rate, a.min(b));
				} else {
					assert_eq!(rate, a.max(b));
				}
			}
		}
	}

	#[test]
	fn test_bucket_burst_is_one_second() {
		let bucket = RateBucket::new(1000);
		assert_eq!(bucket.capacity(), 1000);
		assert!(bucket.check_n(600).is_ok());
		assert!(bucket.check_n(400).is_ok());
		let wait = bucket.check_n(500).unwrap_err();
		assert!(wait > Duration::ZERO);
		assert!(wait <= Duration::from_secs(1));
	}

	#[test]
	fn test_zero_bytes_always_pass() {
		let bucket = RateBucket::new(10);
		assert!(bucket.check_n(10).is_ok());
		assert!(bucket.check_n(0).is_ok());
	}

	#[test]
	fn test_set_rate_in_place() {
		let bucket = RateBucket::new(100);
		bucket.set_rate(5000);
		assert_eq!(bucket.rate(), 5000);
		assert_eq!(bucket.capacity(), 5000);
		// Was full, stays full
		assert!(bucket.check_n(5000).is_ok());
	}

	#[test]
	fn test_set_rate_keeps_drained_bucket_drained() {
		let bucket = RateBucket::new(100);
		assert!(bucket.check_n(100).is_ok());
		assert!(bucket.check_n(1).is_err());

		bucket.set_rate(5000);
		assert_eq!(bucket.capacity(), 5000);
		assert!(bucket.check_n(1000).is_err());
	}

	#[test]
	fn test_set_rate_carries_partial_fill() {
		let bucket = RateBucket::new(10_000);
		assert!(bucket.check_n(5000).is_ok());

		bucket.set_rate(20_000);
		// Roughly half of the new burst is left
		assert!(bucket.check_n(12_000).is_err());
		assert!(bucket.check_n(8000).is_ok());
	}

	#[test]
	fn test_rate_saturates_to_u32() {
		let bucket = RateBucket::new(u64::MAX);
		assert_eq!(bucket.capacity(), u64::from(u32::MAX));
	}

	#[tokio::test]
	async fn test_until_n_ready_splits_large_requests() {
		let bucket = RateBucket::new(1_000_000);
		// Two full bursts: the first is free, the second waits ~1s at most
		tokio::time::timeout(Duration::from_secs(3), bucket.until_n_ready(1_500_000))
			.await
			.unwrap();
	}

	#[test]
	fn test_table_single_instance() {
		let table = BucketTable::default();
		let a = table.get_or_create(&alice(), 100);
		let b = table.get_or_create(&alice(), 999);
		assert!(Arc::ptr_eq(&a, &b));
		assert_eq!(b.rate(), 100);
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn test_table_adjust() {
		let table = BucketTable::default();
		let bucket = table.get_or_create(&alice(), 100);

		table.adjust(&alice(), 250);
		assert_eq!(bucket.rate(), 250);

		table.adjust(&alice(), 0);
		assert!(table.get(&alice()).is_none());

		// Adjusting an absent user does not create a bucket
		table.adjust(&alice(), 300);
		assert_eq!(table.len(), 0);
	}
}

// vim: ts=4

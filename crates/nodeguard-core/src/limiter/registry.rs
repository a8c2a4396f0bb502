//! Inbound Registry
//!
//! Top-level entry point: maps inbound tags to their isolated state and
//! routes data-plane and reporting calls to it. Each operation touches only
//! its own inbound; concurrent operations on one tag are last-writer-wins.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;

use nodeguard_types::ledger_adapter::LedgerStore;
use nodeguard_types::online::OnlineUser;

use super::alive::AliveIpTable;
use super::api::{Admission, InboundStats};
use super::bucket::determine_rate;
use super::config::GlobalLimitConfig;
use super::inbound::InboundState;
use super::ledger::GlobalLedger;
use crate::prelude::*;

/// Type-erased constructor for the distributed ledger tier.
/// Called on every inbound add that enables global limiting.
pub type RemoteStoreFn =
	Box<dyn Fn(&GlobalLimitConfig) -> NgResult<Arc<dyn LedgerStore>> + Send + Sync>;

pub struct Limiter {
	inbounds: DashMap<Box<str>, Arc<InboundState>>,
	alive_ips: AliveIpTable,
	remote_store: Option<RemoteStoreFn>,
}

impl Default for Limiter {
	fn default() -> Self {
		Self::new()
	}
}

impl Limiter {
	/// Limiter whose global ledger only uses the in-process tier
	pub fn new() -> Self {
		Self { inbounds: DashMap::new(), alive_ips: AliveIpTable::new(), remote_store: None }
	}

	/// Limiter that provisions a distributed tier through `remote_store`
	pub fn with_remote_store(remote_store: RemoteStoreFn) -> Self {
		Self { remote_store: Some(remote_store), ..Self::new() }
	}

	/// Builds a fresh state for `tag` and replaces any previous one
	pub fn add_inbound(
		&self,
		tag: &str,
		node_speed_limit: u64,
		users: &[UserInfo],
		global_limit: Option<&GlobalLimitConfig>,
	) -> NgResult<()> {
		let ledger = global_limit.filter(|config| config.enable).map(|config| {
			let remote = match &self.remote_store {
				Some(build) => match build(config) {
					Ok(store) => Some(store),
					Err(err) => {
						error!("[{}] distributed ledger unavailable, using local tier only: {}", tag, err);
						None
					}
				},
				None => None,
			};
			GlobalLedger::new(config, remote)
		});

		let global = ledger.is_some();
		let state = InboundState::new(tag, node_speed_limit, users, ledger);
		self.inbounds.insert(tag.into(), Arc::new(state));
		info!(
			"Inbound limiter added: {} ({} users, node limit {} B/s, global limit {})",
			tag,
			users.len(),
			node_speed_limit,
			if global { "on" } else { "off" }
		);
		Ok(())
	}

	/// Same as [`Limiter::add_inbound`] with a ledger built by the caller
	pub fn add_inbound_with_ledger(
		&self,
		tag: &str,
		node_speed_limit: u64,
		users: &[UserInfo],
		ledger: GlobalLedger,
	) -> NgResult<()> {
		let state = InboundState::new(tag, node_speed_limit, users, Some(ledger));
		self.inbounds.insert(tag.into(), Arc::new(state));
		info!("Inbound limiter added: {} ({} users, custom ledger)", tag, users.len());
		Ok(())
	}

	/// Refreshes user quotas; live buckets pick up the new rate immediately
	pub fn update_inbound(&self, tag: &str, users: &[UserInfo]) -> NgResult<()> {
		let inbound = self.get_inbound(tag)?;
		inbound.update_users(users);
		debug!("Inbound limiter updated: {} ({} users)", tag, users.len());
		Ok(())
	}

	pub fn delete_inbound(&self, tag: &str) -> NgResult<()> {
		if self.inbounds.remove(tag).is_some() {
			info!("Inbound limiter deleted: {}", tag);
		}
		Ok(())
	}

	/// Clears the traffic baseline of the reporting cycle
	pub fn reset_traffic(&self, tag: &str) -> NgResult<()> {
		self.get_inbound(tag)?.reset_traffic();
		Ok(())
	}

	/// Admission check for a new connection.
	///
	/// Local device limits apply to connection-oriented traffic only. The
	/// global ledger, if enabled, is consulted next and may suspend for at
	/// most its configured timeout. Unknown tags are an error; callers should
	/// let such connections through unthrottled.
	pub async fn get_user_bucket(
		&self,
		tag: &str,
		user: &UserKey,
		ip: IpAddr,
		connection_oriented: bool,
	) -> NgResult<Admission> {
		let inbound = self.get_inbound(tag)?;
		let quota = inbound.quota(user);

		if connection_oriented {
			let alive_ips = self.alive_ips.lookup(quota.uid);
			let alive_ips = alive_ips.as_deref().unwrap_or(&[]);
			if !inbound.devices.admit(user, &quota, ip, alive_ips) {
				return Ok(Admission::Rejected);
			}
		}

		if let Some(ledger) = inbound.ledger() {
			if ledger.check(user, quota.uid, ip, quota.device_limit).await {
				return Ok(Admission::Rejected);
			}
		}

		let rate = determine_rate(inbound.node_speed_limit, quota.speed_limit);
		if rate == 0 {
			return Ok(Admission::Unlimited);
		}
		Ok(Admission::Limited(inbound.buckets.get_or_create(user, rate)))
	}

	/// Runs the reporting cycle of `tag`.
	///
	/// Returns the online users and whether the snapshot changed since the
	/// previous cycle.
	pub fn get_online_devices(
		&self,
		tag: &str,
		traffic: &HashMap<Uid, u64>,
		threshold: u64,
	) -> NgResult<(Vec<OnlineUser>, bool)> {
		let report = self.get_inbound(tag)?.reconcile(traffic, threshold);
		Ok((report.users, report.changed))
	}

	/// Publishes a new alive-IP table, returns false if it was unchanged
	pub fn update_alive_ips(&self, table: HashMap<Uid, Vec<IpAddr>>) -> bool {
		self.alive_ips.replace(table)
	}

	pub fn alive_ips(&self) -> &AliveIpTable {
		&self.alive_ips
	}

	pub fn stats(&self, tag: &str) -> NgResult<InboundStats> {
		Ok(self.get_inbound(tag)?.stats())
	}

	pub fn inbound(&self, tag: &str) -> Option<Arc<InboundState>> {
		self.inbounds.get(tag).map(|e| e.value().clone())
	}

	pub fn tags(&self) -> Vec<Box<str>> {
		self.inbounds.iter().map(|e| e.key().clone()).collect()
	}

	fn get_inbound(&self, tag: &str) -> NgResult<Arc<InboundState>> {
		self.inbound(tag).ok_or_else(|| {
			debug!("Get inbound limiter information failed: {}", tag);
			Error::UnknownInbound(tag.into())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::Ipv4Addr;

	const TAG: &str = "vless-443";

	fn ip(last: u8) -> IpAddr {
		IpAddr::V4(Ipv4Addr::new(198, 51, 100, last))
	}

	fn user_info(uid: u32, speed_limit: u64, device_limit: u32) -> UserInfo {
		UserInfo { uid: Uid(uid), identifier: format!("u{}@panel.user", uid).into(), speed_limit, device_limit }
	}

	fn key(uid: u32) -> UserKey {
		user_info(uid, 0, 0).key(TAG)
	}

	#[tokio::test]
	async fn test_unknown_inbound() {
		let limiter = Limiter::new();
		let res = limiter.get_user_bucket("nope", &key(1), ip(1), true).await;
		assert!(matches!(res, Err(Error::UnknownInbound(_))));
		assert!(matches!(limiter.update_inbound("nope", &[]), Err(Error::UnknownInbound(_))));
		assert!(matches!(limiter.reset_traffic("nope"), Err(Error::UnknownInbound(_))));
		assert!(limiter.delete_inbound("nope").is_ok());
	}

	#[tokio::test]
	async fn test_unlimited_user() {
		let limiter = Limiter::new();
		limiter.add_inbound(TAG, 0, &[user_info(1, 0, 0)], None).unwrap();

		let admission = limiter.get_user_bucket(TAG, &key(1), ip(1), true).await.unwrap();
		assert!(matches!(admission, Admission::Unlimited));
		assert_eq!(limiter.stats(TAG).unwrap().buckets, 0);
	}

	#[tokio::test]
	async fn test_node_limit_applies() {
		let limiter = Limiter::new();
		limiter.add_inbound(TAG, 2048, &[user_info(1, 0, 0)], None).unwrap();

		let admission = limiter.get_user_bucket(TAG, &key(1), ip(1), false).await.unwrap();
		assert_eq!(admission.bucket().map(|b| b.rate()), Some(2048));
	}

	#[tokio::test]
	async fn test_connectionless_skips_device_limit() {
		let limiter = Limiter::new();
		limiter.add_inbound(TAG, 0, &[user_info(1, 0, 1)], None).unwrap();

		assert!(!limiter.get_user_bucket(TAG, &key(1), ip(1), true).await.unwrap().is_rejected());
		assert!(limiter.get_user_bucket(TAG, &key(1), ip(2), true).await.unwrap().is_rejected());
		assert!(!limiter.get_user_bucket(TAG, &key(1), ip(2), false).await.unwrap().is_rejected());
	}

	#[tokio::test]
	async fn test_update_and_delete() {
		let limiter = Limiter::new();
		limiter.add_inbound(TAG, 0, &[user_info(1, 1000, 0)], None).unwrap();
		let bucket = limiter
			.get_user_bucket(TAG, &key(1), ip(1), true)
			.await
			.unwrap()
			.bucket()
			.cloned()
			.unwrap();

		limiter.update_inbound(TAG, &[user_info(1, 4000, 0)]).unwrap();
		assert_eq!(bucket.rate(), 4000);

		limiter.update_inbound(TAG, &[user_info(1, 0, 0)]).unwrap();
		assert_eq!(limiter.stats(TAG).unwrap().buckets, 0);

		limiter.delete_inbound(TAG).unwrap();
		assert!(limiter.inbound(TAG).is_none());
	}

	#[tokio::test]
	async fn test_add_replaces_state() {
		let limiter = Limiter::new();
		limiter.add_inbound(TAG, 0, &[user_info(1, 0, 1)], None).unwrap();
		limiter.get_user_bucket(TAG, &key(1), ip(1), true).await.unwrap();
		assert_eq!(limiter.stats(TAG).unwrap().online_users, 1);

		limiter.add_inbound(TAG, 0, &[user_info(1, 0, 1)], None).unwrap();
		assert_eq!(limiter.stats(TAG).unwrap().online_users, 0);
		assert_eq!(limiter.tags(), vec![Box::<str>::from(TAG)]);
	}

	#[tokio::test]
	async fn test_failed_remote_store_falls_back_to_local() {
		let limiter = Limiter::with_remote_store(Box::new(
			|_config: &GlobalLimitConfig| -> NgResult<Arc<dyn LedgerStore>> {
				Err(Error::ConfigError("bad address".into()))
			},
		));
		let config = GlobalLimitConfig { enable: true, ..Default::default() };
		limiter.add_inbound(TAG, 0, &[user_info(1, 0, 2)], Some(&config)).unwrap();

		let inbound = limiter.inbound(TAG).unwrap();
		assert!(inbound.ledger().is_some());
		assert!(!limiter.get_user_bucket(TAG, &key(1), ip(1), true).await.unwrap().is_rejected());
	}

	#[tokio::test]
	async fn test_disabled_global_limit_has_no_ledger() {
		let limiter = Limiter::new();
		let config = GlobalLimitConfig::default();
		limiter.add_inbound(TAG, 0, &[], Some(&config)).unwrap();
		assert!(limiter.inbound(TAG).unwrap().ledger().is_none());
	}
}

// vim: ts=4

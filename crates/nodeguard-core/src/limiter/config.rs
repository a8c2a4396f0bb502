//! Global Device Limit Configuration
//!
//! Settings for the cross-node device ledger. Field names follow the node
//! configuration file (camelCase).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport used to reach the distributed cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisNetwork {
	#[default]
	Tcp,
	Unix,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalLimitConfig {
	pub enable: bool,
	/// Ledger entry TTL in seconds
	pub expiry: u64,
	/// Per-operation deadline in seconds
	pub timeout: u64,
	pub redis_network: RedisNetwork,
	/// `host:port` for tcp, socket path for unix
	pub redis_addr: String,
	pub redis_username: Option<String>,
	pub redis_password: Option<String>,
	pub redis_db: i64,
	/// Upper bound on entries kept by the in-process tier
	pub local_capacity: usize,
}

impl Default for GlobalLimitConfig {
	fn default() -> Self {
		Self {
			enable: false,
			expiry: 60,
			timeout: 5,
			redis_network: RedisNetwork::Tcp,
			redis_addr: "127.0.0.1:6379".into(),
			redis_username: None,
			redis_password: None,
			redis_db: 0,
			local_capacity: 100_000,
		}
	}
}

impl GlobalLimitConfig {
	pub fn expiry_duration(&self) -> Duration {
		Duration::from_secs(self.expiry)
	}

	pub fn timeout_duration(&self) -> Duration {
		Duration::from_secs(self.timeout)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_partial_config_uses_defaults() {
		let config: GlobalLimitConfig = serde_json::from_str(
			r#"{"enable": true, "expiry": 120, "redisAddr": "cache:6380", "redisNetwork": "tcp"}"#,
		)
		.unwrap();

		assert!(config.enable);
		assert_eq!(config.expiry_duration(), Duration::from_secs(120));
		assert_eq!(config.timeout_duration(), Duration::from_secs(5));
		assert_eq!(config.redis_addr, "cache:6380");
		assert_eq!(config.redis_db, 0);
		assert_eq!(config.local_capacity, 100_000);
	}

	#[test]
	fn test_unix_network() {
		let config: GlobalLimitConfig =
			serde_json::from_str(r#"{"redisNetwork": "unix", "redisAddr": "/run/redis.sock"}"#)
				.unwrap();
		assert_eq!(config.redis_network, RedisNetwork::Unix);
		assert!(!config.enable);
	}
}

// vim: ts=4

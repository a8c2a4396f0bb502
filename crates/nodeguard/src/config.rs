//! Node configuration file

use std::path::Path;

use serde::Deserialize;

use crate::limiter::GlobalLimitConfig;
use crate::prelude::*;
use crate::types::QuotaOverrides;

/// Settings of one limited inbound, as read from the node's YAML file.
///
/// ```yaml
/// tag: vless-443
/// speedLimit: 0
/// deviceLimit: 2
/// onlineThreshold: 1024
/// globalDeviceLimit:
///   enable: true
///   redisAddr: 10.0.0.5:6379
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
	pub tag: Box<str>,
	/// Node-wide cap in bytes/s, 0 = none
	#[serde(default)]
	pub speed_limit: u64,
	/// Overrides every user's device limit when non-zero
	#[serde(default)]
	pub device_limit: u32,
	/// Overrides every user's speed limit (Mbit/s, fractions allowed) when non-zero
	#[serde(default)]
	pub speed_limit_mbps: f64,
	/// Minimum traffic growth (bytes) per cycle for a user to count as active
	#[serde(default)]
	pub online_threshold: u64,
	#[serde(default)]
	pub global_device_limit: GlobalLimitConfig,
}

impl NodeConfig {
	pub fn new(tag: impl Into<Box<str>>) -> Self {
		Self {
			tag: tag.into(),
			speed_limit: 0,
			device_limit: 0,
			speed_limit_mbps: 0.0,
			online_threshold: 0,
			global_device_limit: GlobalLimitConfig::default(),
		}
	}

	pub fn from_yaml(yaml: &str) -> NgResult<Self> {
		let config: Self = serde_yaml::from_str(yaml).map_err(|e| Error::Parse(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub async fn load(path: impl AsRef<Path>) -> NgResult<Self> {
		let path = path.as_ref();
		let yaml = tokio::fs::read_to_string(path).await?;
		debug!("Loading node configuration from {}", path.display());
		Self::from_yaml(&yaml)
	}

	/// Local overrides applied to panel-provided user limits
	pub fn overrides(&self) -> QuotaOverrides {
		QuotaOverrides { speed_limit_mbps: self.speed_limit_mbps, device_limit: self.device_limit }
	}

	fn validate(&self) -> NgResult<()> {
		if self.tag.is_empty() {
			return Err(Error::ConfigError("inbound tag must not be empty".into()));
		}
		let global = &self.global_device_limit;
		if global.enable {
			if global.timeout == 0 {
				return Err(Error::ConfigError("globalDeviceLimit.timeout must be positive".into()));
			}
			if global.redis_addr.is_empty() {
				return Err(Error::ConfigError("globalDeviceLimit.redisAddr is required".into()));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::limiter::RedisNetwork;
	use crate::types::mbps_to_bytes_per_sec;

	#[test]
	fn test_full_config() {
		let config = NodeConfig::from_yaml(
			"tag: trojan-443
speedLimit: 12500000
deviceLimit: 3
speedLimitMbps: 50
onlineThreshold: 2048
globalDeviceLimit:
  enable: true
  expiry: 120
  timeout: 2
  redisNetwork: unix
  redisAddr: /run/redis.sock
  redisDb: 4
",
		)
		.unwrap();

		assert_eq!(&*config.tag, "trojan-443");
		assert_eq!(config.speed_limit, 12_500_000);
		assert_eq!(config.online_threshold, 2048);
		assert_eq!(config.overrides(), QuotaOverrides { speed_limit_mbps: 50.0, device_limit: 3 });
		assert!(config.global_device_limit.enable);
		assert_eq!(config.global_device_limit.redis_network, RedisNetwork::Unix);
		assert_eq!(config.global_device_limit.redis_db, 4);
		assert_eq!(config.global_device_limit.local_capacity, 100_000);
	}

	#[test]
	fn test_fractional_speed_override() {
		let config = NodeConfig::from_yaml("tag: ss-8388\nspeedLimitMbps: 0.5\n").unwrap();
		assert_eq!(mbps_to_bytes_per_sec(config.overrides().speed_limit_mbps), 62_500);
	}

	#[test]
	fn test_minimal_config() {
		let config = NodeConfig::from_yaml("tag: vmess-80\n").unwrap();
		assert_eq!(config, NodeConfig::new("vmess-80"));
		assert!(!config.global_device_limit.enable);
	}

	#[test]
	fn test_invalid_configs() {
		assert!(matches!(NodeConfig::from_yaml("tag: ''\n"), Err(Error::ConfigError(_))));
		assert!(matches!(NodeConfig::from_yaml("speedLimit: 1\n"), Err(Error::Parse(_))));
		assert!(matches!(
			NodeConfig::from_yaml("tag: a\nglobalDeviceLimit:\n  enable: true\n  timeout: 0\n"),
			Err(Error::ConfigError(_))
		));
	}
}

// vim: ts=4

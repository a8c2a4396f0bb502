//! Common types used throughout NodeGuard.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Uid //
//*****//
/// Numeric user identity assigned by the panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u32);

impl std::fmt::Display for Uid {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Uid {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_u32(self.0)
	}
}

impl<'de> Deserialize<'de> for Uid {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Uid(u32::deserialize(deserializer)?))
	}
}

// UserKey //
//*********//
/// Identifies one user on one inbound.
///
/// The same panel user on two inbounds gets two keys, so quota, bucket and
/// device state never leak between inbounds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserKey {
	/// Inbound tag
	pub tag: Box<str>,
	/// External identifier of the user (e.g. `<uuid>@panel.user`)
	pub identifier: Box<str>,
	pub uid: Uid,
}

impl UserKey {
	pub fn new(tag: impl Into<Box<str>>, identifier: impl Into<Box<str>>, uid: Uid) -> Self {
		Self { tag: tag.into(), identifier: identifier.into(), uid }
	}
}

impl std::fmt::Display for UserKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}|{}|{}", self.tag, self.identifier, self.uid)
	}
}

// UserQuota //
//***********//
/// Per-user limits. Zero means unlimited for both fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserQuota {
	pub uid: Uid,
	/// Bytes per second
	pub speed_limit: u64,
	/// Maximum concurrently bound IPs
	pub device_limit: u32,
}

/// A user entry as delivered by the config-sync collaborator
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
	pub uid: Uid,
	pub identifier: Box<str>,
	/// Bytes per second, 0 = unlimited
	#[serde(default)]
	pub speed_limit: u64,
	/// 0 = unlimited
	#[serde(default)]
	pub device_limit: u32,
}

impl UserInfo {
	pub fn key(&self, tag: &str) -> UserKey {
		UserKey::new(tag, self.identifier.clone(), self.uid)
	}

	pub fn quota(&self) -> UserQuota {
		UserQuota { uid: self.uid, speed_limit: self.speed_limit, device_limit: self.device_limit }
	}
}

// Quota normalization //
//*********************//
/// Node-local overrides that take precedence over panel-provided limits
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaOverrides {
	/// Mbit/s, fractions allowed, 0 = use the panel value
	#[serde(default)]
	pub speed_limit_mbps: f64,
	/// 0 = use the panel value
	#[serde(default)]
	pub device_limit: u32,
}

/// User record in the panel's wire format (speed in Mbit/s)
#[derive(Clone, Debug, Deserialize)]
pub struct PanelUser {
	pub id: Uid,
	pub uuid: Box<str>,
	#[serde(default)]
	pub speed_limit: Option<f64>,
	#[serde(default)]
	pub device_limit: Option<u32>,
}

impl PanelUser {
	pub fn into_user_info(self, overrides: &QuotaOverrides) -> UserInfo {
		let speed_mbps = if overrides.speed_limit_mbps > 0.0 {
			overrides.speed_limit_mbps
		} else {
			self.speed_limit.unwrap_or(0.0)
		};
		let device_limit = if overrides.device_limit > 0 {
			overrides.device_limit
		} else {
			self.device_limit.unwrap_or(0)
		};

		UserInfo {
			uid: self.id,
			identifier: format!("{}@panel.user", self.uuid).into(),
			speed_limit: mbps_to_bytes_per_sec(speed_mbps),
			device_limit,
		}
	}
}

/// Convert Mbit/s into bytes/s, rounding down.
/// Negative and non-finite inputs count as unlimited.
pub fn mbps_to_bytes_per_sec(mbps: f64) -> u64 {
	if !mbps.is_finite() || mbps <= 0.0 {
		return 0;
	}
	// `as` saturates at u64::MAX
	(mbps * 1_000_000.0 / 8.0) as u64
}

/// Cached ledger entry: IP (textual form) -> UID
pub type DeviceMap = HashMap<String, Uid>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_user_key_display() {
		let key = UserKey::new("vmess-8443", "abc@panel.user", Uid(42));
		assert_eq!(key.to_string(), "vmess-8443|abc@panel.user|42");
	}

	#[test]
	fn test_mbps_conversion() {
		assert_eq!(mbps_to_bytes_per_sec(0.0), 0);
		assert_eq!(mbps_to_bytes_per_sec(8.0), 1_000_000);
		assert_eq!(mbps_to_bytes_per_sec(100.0), 12_500_000);
		assert_eq!(mbps_to_bytes_per_sec(0.5), 62_500);
		assert_eq!(mbps_to_bytes_per_sec(2.5), 312_500);
		assert_eq!(mbps_to_bytes_per_sec(-3.0), 0);
		assert_eq!(mbps_to_bytes_per_sec(f64::NAN), 0);
		assert_eq!(mbps_to_bytes_per_sec(f64::MAX), u64::MAX);
	}

	#[test]
	fn test_panel_user_prefers_local_overrides() {
		let user = PanelUser {
			id: Uid(7),
			uuid: "u-7".into(),
			speed_limit: Some(100.0),
			device_limit: Some(3),
		};
		let info = user
			.clone()
			.into_user_info(&QuotaOverrides { speed_limit_mbps: 8.0, device_limit: 1 });
		assert_eq!(info.speed_limit, 1_000_000);
		assert_eq!(info.device_limit, 1);
		assert_eq!(&*info.identifier, "u-7@panel.user");

		let info = user.into_user_info(&QuotaOverrides::default());
		assert_eq!(info.speed_limit, 12_500_000);
		assert_eq!(info.device_limit, 3);
	}

	#[test]
	fn test_panel_user_fractional_speed() {
		let user: PanelUser =
			serde_json::from_str(r#"{"id": 4, "uuid": "u-4", "speed_limit": 0.5}"#).unwrap();
		let info = user.into_user_info(&QuotaOverrides::default());
		assert_eq!(info.speed_limit, 62_500);
		assert_eq!(info.device_limit, 0);

		// Whole numbers from the panel still parse
		let user: PanelUser = serde_json::from_str(r#"{"id": 5, "uuid": "u-5", "speed_limit": 16}"#).unwrap();
		assert_eq!(user.into_user_info(&QuotaOverrides::default()).speed_limit, 2_000_000);
	}

	#[test]
	fn test_device_map_json_shape() {
		let mut map = DeviceMap::new();
		map.insert("10.0.0.1".into(), Uid(5));
		let json = serde_json::to_string(&map).unwrap();
		assert_eq!(json, r#"{"10.0.0.1":5}"#);
		let back: DeviceMap = serde_json::from_str(&json).unwrap();
		assert_eq!(back.get("10.0.0.1"), Some(&Uid(5)));
	}
}

// vim: ts=4

//! Redis-based Global Ledger Adapter
//!
//! Implements the `LedgerStore` trait on top of a shared Redis instance, the
//! distributed tier all proxy nodes of a deployment read and write.
//!
//! # Storage Layout
//!
//! One string key per ledger entry, holding the device map as JSON:
//! `{"<ip>": <uid>, ...}`. Entries carry a Redis-side TTL (`SET .. EX`), so
//! nothing has to be cleaned up by the nodes.
//!
//! # Connection Handling
//!
//! A multiplexed connection is opened lazily on first use and shared by all
//! callers. It is dropped after an I/O error and reopened on the next call.
//! The adapter applies no timeouts of its own; callers bound every call.

use nodeguard::error::NgResult;
use nodeguard::ledger_adapter::LedgerStore;
use nodeguard::types::DeviceMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

mod error;
pub use error::Error;

/// How the adapter reaches the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Network {
	#[default]
	Tcp,
	Unix,
}

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct AdapterConfig {
	pub network: Network,
	/// `host:port` for TCP, socket path for Unix
	pub addr: String,
	pub username: Option<String>,
	pub password: Option<String>,
	pub db: i64,
}

impl Default for AdapterConfig {
	fn default() -> Self {
		Self {
			network: Network::Tcp,
			addr: "127.0.0.1:6379".into(),
			username: None,
			password: None,
			db: 0,
		}
	}
}

impl AdapterConfig {
	/// Connection URL understood by the redis client
	pub fn connection_url(&self) -> Result<url::Url, Error> {
		match self.network {
			Network::Tcp => {
				if self.addr.is_empty() || self.addr.contains('/') {
					return Err(Error::ConfigError(format!("invalid redis address: {:?}", self.addr)));
				}
				let mut url = url::Url::parse(&format!("redis://{}/{}", self.addr, self.db))
					.map_err(|e| Error::ConfigError(format!("invalid redis address: {}", e)))?;
				if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
					url.set_username(username)
						.map_err(|()| Error::ConfigError("invalid redis username".into()))?;
				}
				if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
					url.set_password(Some(password))
						.map_err(|()| Error::ConfigError("invalid redis password".into()))?;
				}
				Ok(url)
			}
			Network::Unix => {
				if !self.addr.starts_with('/') {
					return Err(Error::ConfigError(format!(
						"unix socket path must be absolute: {:?}",
						self.addr
					)));
				}
				let mut url = url::Url::parse("redis+unix:///")
					.map_err(|e| Error::ConfigError(e.to_string()))?;
				url.set_path(&self.addr);
				{
					let mut query = url.query_pairs_mut();
					query.append_pair("db", &self.db.to_string());
					if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
						query.append_pair("user", username);
					}
					if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
						query.append_pair("pass", password);
					}
				}
				Ok(url)
			}
		}
	}
}

/// Redis-backed ledger store
pub struct LedgerAdapterRedis {
	client: redis::Client,
	conn: Mutex<Option<MultiplexedConnection>>,
	/// Printable address, without credentials
	addr: String,
}

impl fmt::Debug for LedgerAdapterRedis {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LedgerAdapterRedis").field("addr", &self.addr).finish()
	}
}

impl LedgerAdapterRedis {
	/// Creates the adapter. No connection is made until the first call.
	pub fn new(config: &AdapterConfig) -> Result<Self, Error> {
		let url = config.connection_url()?;
		let client = redis::Client::open(url.as_str())
			.map_err(|e| Error::ConfigError(format!("failed to open redis client: {}", e)))?;
		debug!("Redis ledger adapter configured for {}", config.addr);
		Ok(Self { client, conn: Mutex::new(None), addr: config.addr.clone() })
	}

	pub fn addr(&self) -> &str {
		&self.addr
	}

	async fn connection(&self) -> Result<MultiplexedConnection, Error> {
		let mut guard = self.conn.lock().await;
		if let Some(conn) = guard.as_ref() {
			return Ok(conn.clone());
		}
		let conn = self.client.get_multiplexed_async_connection().await.map_err(|e| {
			Error::ConnectionError(format!("failed to connect to {}: {}", self.addr, e))
		})?;
		trace!("Redis ledger connection opened: {}", self.addr);
		*guard = Some(conn.clone());
		Ok(conn)
	}

	/// Maps a command failure, dropping the cached connection if it broke
	async fn command_error(&self, err: redis::RedisError) -> Error {
		if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
			warn!("Redis ledger connection lost ({}): {}", self.addr, err);
			*self.conn.lock().await = None;
			return Error::ConnectionError(err.to_string());
		}
		Error::CommandError(err.to_string())
	}

	async fn get_entry(&self, key: &str) -> Result<Option<DeviceMap>, Error> {
		let mut conn = self.connection().await?;
		let res: redis::RedisResult<Option<String>> =
			redis::cmd("GET").arg(key).query_async(&mut conn).await;
		let raw = match res {
			Ok(raw) => raw,
			Err(err) => return Err(self.command_error(err).await),
		};
		match raw {
			Some(json) => Ok(Some(serde_json::from_str(&json)?)),
			None => Ok(None),
		}
	}

	async fn set_entry(&self, key: &str, devices: &DeviceMap, ttl: Duration) -> Result<(), Error> {
		let json = serde_json::to_string(devices)?;
		let mut conn = self.connection().await?;
		let res: redis::RedisResult<()> = redis::cmd("SET")
			.arg(key)
			.arg(json)
			.arg("EX")
			.arg(ttl.as_secs().max(1))
			.query_async(&mut conn)
			.await;
		match res {
			Ok(()) => Ok(()),
			Err(err) => Err(self.command_error(err).await),
		}
	}
}

#[async_trait]
impl LedgerStore for LedgerAdapterRedis {
	fn name(&self) -> &'static str {
		"redis"
	}

	async fn get(&self, key: &str) -> NgResult<Option<DeviceMap>> {
		Ok(self.get_entry(key).await?)
	}

	async fn set(&self, key: &str, devices: &DeviceMap, ttl: Duration) -> NgResult<()> {
		Ok(self.set_entry(key, devices, ttl).await?)
	}
}


// vim: ts=4

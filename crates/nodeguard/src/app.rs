//! Node builder - wires logging, configuration and the ledger backend into a limiter

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::NodeConfig;
use crate::ledger_adapter::LedgerStore;
use crate::ledger_adapter_redis::{AdapterConfig, LedgerAdapterRedis, Network};
use crate::limiter::{GlobalLimitConfig, InboundStats, RedisNetwork, RemoteStoreFn};
use crate::online::OnlineReport;
use crate::prelude::*;
use crate::types::PanelUser;
use crate::Limiter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the distributed ledger tier on Redis
pub fn redis_store(config: &GlobalLimitConfig) -> NgResult<Arc<dyn LedgerStore>> {
	let adapter_config = AdapterConfig {
		network: match config.redis_network {
			RedisNetwork::Tcp => Network::Tcp,
			RedisNetwork::Unix => Network::Unix,
		},
		addr: config.redis_addr.clone(),
		username: config.redis_username.clone(),
		password: config.redis_password.clone(),
		db: config.redis_db,
	};
	Ok(Arc::new(LedgerAdapterRedis::new(&adapter_config)?))
}

pub struct NodeBuilder {
	config: Option<NodeConfig>,
	config_file: Option<PathBuf>,
	remote_store: Option<RemoteStoreFn>,
}

impl NodeBuilder {
	pub fn new() -> Self {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		NodeBuilder { config: None, config_file: None, remote_store: None }
	}

	pub fn config(&mut self, config: NodeConfig) -> &mut Self {
		self.config = Some(config);
		self
	}
	pub fn config_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
		self.config_file = Some(path.into());
		self
	}
	/// Replaces the Redis backend of the global ledger
	pub fn remote_store(&mut self, remote_store: RemoteStoreFn) -> &mut Self {
		self.remote_store = Some(remote_store);
		self
	}

	pub async fn build(self) -> NgResult<Node> {
		info!("NodeGuard V{}", VERSION);

		let config = match (self.config, self.config_file) {
			(Some(config), _) => config,
			(None, Some(path)) => NodeConfig::load(&path).await.inspect_err(|e| {
				error!("FATAL: Failed to load node configuration {}: {}", path.display(), e);
			})?,
			(None, None) => {
				error!("FATAL: No node configuration");
				return Err(Error::ConfigError("no node configuration".into()));
			}
		};

		let remote_store: RemoteStoreFn = match self.remote_store {
			Some(remote_store) => remote_store,
			None => Box::new(redis_store),
		};
		let node = Node {
			limiter: Arc::new(Limiter::with_remote_store(remote_store)),
			config,
		};
		info!(
			"Node ready: inbound {}, node limit {} B/s, online threshold {} B",
			node.config.tag, node.config.speed_limit, node.config.online_threshold
		);
		Ok(node)
	}
}

impl Default for NodeBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// One limited inbound of a running node
pub struct Node {
	limiter: Arc<Limiter>,
	config: NodeConfig,
}

impl Node {
	pub fn limiter(&self) -> &Arc<Limiter> {
		&self.limiter
	}

	pub fn config(&self) -> &NodeConfig {
		&self.config
	}

	pub fn tag(&self) -> &str {
		&self.config.tag
	}

	/// Applies a user list fetched from the panel.
	///
	/// The first sync builds the inbound; later ones retune it in place.
	pub fn sync_users(&self, users: Vec<PanelUser>) -> NgResult<()> {
		let overrides = self.config.overrides();
		let users: Vec<UserInfo> =
			users.into_iter().map(|user| user.into_user_info(&overrides)).collect();

		if self.limiter.inbound(self.tag()).is_some() {
			self.limiter.update_inbound(self.tag(), &users)
		} else {
			self.limiter.add_inbound(
				self.tag(),
				self.config.speed_limit,
				&users,
				Some(&self.config.global_device_limit),
			)
		}
	}

	/// Runs one reporting cycle and groups the result per user.
	///
	/// Returns the report and whether it differs from the previous cycle.
	pub fn report(&self, traffic: &HashMap<Uid, u64>) -> NgResult<(OnlineReport, bool)> {
		let (users, changed) =
			self.limiter.get_online_devices(self.tag(), traffic, self.config.online_threshold)?;
		let report = OnlineReport::from_users(&users);
		debug!("[{}] report: {} users, changed={}", self.tag(), report.devices.len(), changed);
		Ok((report, changed))
	}

	/// Restarts idle detection after the traffic counters were reset upstream
	pub fn reset_traffic(&self) -> NgResult<()> {
		self.limiter.reset_traffic(self.tag())
	}

	pub fn stats(&self) -> NgResult<InboundStats> {
		self.limiter.stats(self.tag())
	}

	/// Drops all state of the inbound
	pub fn shutdown(&self) -> NgResult<()> {
		self.limiter.delete_inbound(self.tag())
	}
}


// vim: ts=4

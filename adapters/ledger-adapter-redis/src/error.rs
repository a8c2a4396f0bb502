//! Error types for the Redis ledger adapter

use std::fmt;

/// Redis adapter-specific errors
#[derive(Debug)]
pub enum Error {
	/// Invalid connection settings
	ConfigError(String),

	/// Could not reach the server
	ConnectionError(String),

	/// Command failed on an established connection
	CommandError(String),

	/// Stored value is not a device map
	SerializationError(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
			Error::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
			Error::CommandError(msg) => write!(f, "Command error: {}", msg),
			Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<Error> for nodeguard::error::Error {
	fn from(err: Error) -> Self {
		match err {
			Error::ConfigError(msg) => nodeguard::error::Error::ConfigError(msg),
			Error::SerializationError(msg) => nodeguard::error::Error::Parse(msg),
			Error::ConnectionError(_) | Error::CommandError(_) => {
				nodeguard::error::Error::CacheError(err.to_string())
			}
		}
	}
}

// vim: ts=4

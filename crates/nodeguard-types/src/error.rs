//! Error type shared by the core and the adapters.
//!
//! Admission rejections are not errors. They are returned as a regular
//! outcome by the limiter; this type only covers configuration and
//! transport failures.

use std::fmt;

pub type NgResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// An operation referenced an inbound tag that is not registered
	UnknownInbound(Box<str>),
	/// Invalid or inconsistent configuration
	ConfigError(String),
	/// Distributed cache transport error
	CacheError(String),
	/// A bounded operation ran past its deadline
	Timeout,
	/// Malformed payload (cache entry, config file)
	Parse(String),

	// externals
	Io(std::io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::UnknownInbound(tag) => write!(f, "no such inbound in limiter: {}", tag),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::CacheError(msg) => write!(f, "cache service error: {}", msg),
			Error::Timeout => write!(f, "operation timed out"),
			Error::Parse(msg) => write!(f, "parse error: {}", msg),
			Error::Io(err) => write!(f, "I/O error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Parse(err.to_string())
	}
}

impl From<tokio::time::error::Elapsed> for Error {
	fn from(_err: tokio::time::error::Elapsed) -> Self {
		Self::Timeout
	}
}


// vim: ts=4

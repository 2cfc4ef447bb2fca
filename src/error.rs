//! Crate-level error types shared by the lease lock, rate limiter, and stores.

// self
use crate::{_prelude::*, id::IdentifierError, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
///
/// Failing to acquire a lease or being rejected by the rate limiter is never an error; both are
/// reported through return values.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Backing store failure (connectivity, timeout, driver error); never retried internally.
	#[error("{0}")]
	Storage(#[source] StoreError),
	/// The table a component relies on does not exist yet; run migrations before retrying.
	#[error("Table `{table}` is not provisioned; the coordination schema must be set up first.")]
	SchemaNotReady {
		/// Missing table name.
		table: &'static str,
	},
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Caller supplied a malformed identifier.
	#[error(transparent)]
	Identifier(#[from] IdentifierError),
}
impl From<StoreError> for Error {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::MissingTable { table } => Self::SchemaNotReady { table },
			other => Self::Storage(other),
		}
	}
}
impl Error {
	/// Returns `true` when the caller should surface a "setup required" condition.
	pub fn is_schema_not_ready(&self) -> bool {
		matches!(self, Self::SchemaNotReady { .. })
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Rate limiter bucket name is empty.
	#[error("Rate limiter bucket cannot be empty.")]
	EmptyBucket,
	/// Rate limiter key length bound must allow at least one character.
	#[error("Rate limiter key length bound must be greater than zero.")]
	ZeroKeyLength,
	/// SQLite connection could not be configured.
	#[error("SQLite store could not be configured: {message}.")]
	Sqlite {
		/// Driver-supplied message.
		message: String,
	},
}

//! Storage contract for coordination rows and the built-in store implementations.
//!
//! Every mutating operation on [`CoordinationStore`] must be a single atomic conditional write:
//! the guard predicate and the write are evaluated together, with no intermediate state visible
//! to concurrent callers, including callers in other processes.

pub mod memory;
#[cfg(feature = "sqlite")] pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")] pub use sqlite::{SqliteJournalMode, SqliteStore, SqliteStoreConfig};

// self
use crate::{
	_prelude::*,
	id::{HolderId, LockKey},
	record::{CounterSnapshot, LockRecord, RateLimitCounter},
};

/// Boxed future returned by [`CoordinationStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Backing store contract shared by [`LeaseLock`](crate::lease::LeaseLock) and
/// [`RateLimiter`](crate::rate_limit::RateLimiter).
///
/// Implementations own the clock used for every expiry and window computation.
pub trait CoordinationStore
where
	Self: Send + Sync,
{
	/// Reports whether the backing table exists.
	fn table_exists(&self, table: Table) -> StoreFuture<'_, bool>;

	/// Atomically claims a lease.
	///
	/// Inserts the row when the key is unseen; otherwise overwrites holder and expiry only if the
	/// existing lease has expired (or was released) or is already held by `holder`.
	fn claim_lease<'a>(
		&'a self,
		key: &'a LockKey,
		holder: &'a HolderId,
		ttl: Duration,
	) -> StoreFuture<'a, ClaimOutcome>;

	/// Moves `locked_until` to now when the row is held by `holder`; returns whether a row
	/// changed.
	fn expire_lease<'a>(&'a self, key: &'a LockKey, holder: &'a HolderId)
	-> StoreFuture<'a, bool>;

	/// Fetches the lease row, if present.
	fn fetch_lease<'a>(&'a self, key: &'a LockKey) -> StoreFuture<'a, Option<LockRecord>>;

	/// Atomically records one hit, resetting the window when it has elapsed, and returns the
	/// resulting counter state.
	fn record_hit<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
		window: Duration,
	) -> StoreFuture<'a, CounterSnapshot>;

	/// Fetches the counter row, if present.
	fn fetch_counter<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
	) -> StoreFuture<'a, Option<RateLimitCounter>>;
}

/// Tables backing the coordination core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
	/// Lease rows keyed by lock key.
	LeaseLocks,
	/// Rate limit counters keyed by bucket + key.
	RateLimitCounters,
}
impl Table {
	/// Returns the physical table name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Table::LeaseLocks => "lease_locks",
			Table::RateLimitCounters => "rate_limit_counters",
		}
	}
}
impl Display for Table {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Result of a lease claim attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
	/// This call's write took effect; the row now reflects the new lease.
	Claimed(LockRecord),
	/// A different holder's lease is live; nothing was written.
	Contended,
}
impl ClaimOutcome {
	/// Returns `true` when the claim took effect.
	pub fn is_claimed(&self) -> bool {
		matches!(self, Self::Claimed(_))
	}
}

/// Error type produced by [`CoordinationStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// The backing table does not exist.
	#[error("Table `{table}` does not exist.")]
	MissingTable {
		/// Missing table name.
		table: &'static str,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Builds a [`StoreError::MissingTable`] for the provided table.
	pub fn missing_table(table: Table) -> Self {
		Self::MissingTable { table: table.as_str() }
	}
}

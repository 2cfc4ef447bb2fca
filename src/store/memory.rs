//! Thread-safe in-memory [`CoordinationStore`] for single-process deployments and tests.

// std
use std::collections::hash_map::Entry;
// self
use crate::{
	_prelude::*,
	clock::{self, Clock, SystemClock},
	id::{HolderId, LockKey},
	record::{CounterSnapshot, LockRecord, RateLimitCounter},
	store::{ClaimOutcome, CoordinationStore, StoreError, StoreFuture, Table},
};

type CounterKey = (String, String);

#[derive(Debug, Default)]
struct Tables {
	// `None` models a table that has not been provisioned yet.
	leases: Option<HashMap<LockKey, LockRecord>>,
	counters: Option<HashMap<CounterKey, RateLimitCounter>>,
}
impl Tables {
	fn provisioned() -> Self {
		Self { leases: Some(HashMap::new()), counters: Some(HashMap::new()) }
	}

	fn leases_mut(&mut self) -> Result<&mut HashMap<LockKey, LockRecord>, StoreError> {
		self.leases.as_mut().ok_or_else(|| StoreError::missing_table(Table::LeaseLocks))
	}

	fn counters_mut(&mut self) -> Result<&mut HashMap<CounterKey, RateLimitCounter>, StoreError> {
		self.counters.as_mut().ok_or_else(|| StoreError::missing_table(Table::RateLimitCounters))
	}
}

/// Storage backend that keeps coordination rows in-process.
///
/// Each conditional write runs under one exclusive lock, which gives the same indivisibility a
/// single SQL statement gives a relational backend. Clones share the same rows.
#[derive(Clone)]
pub struct MemoryStore {
	tables: Arc<RwLock<Tables>>,
	clock: Arc<dyn Clock>,
}
impl MemoryStore {
	/// Creates a provisioned store driven by the provided clock.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { tables: Arc::new(RwLock::new(Tables::provisioned())), clock }
	}

	/// Creates a store whose tables do not exist yet.
	pub fn unprovisioned(clock: Arc<dyn Clock>) -> Self {
		Self { tables: Arc::new(RwLock::new(Tables::default())), clock }
	}

	/// Creates the table if it is missing.
	pub fn provision(&self, table: Table) {
		let mut guard = self.tables.write();

		match table {
			Table::LeaseLocks => {
				guard.leases.get_or_insert_with(HashMap::new);
			},
			Table::RateLimitCounters => {
				guard.counters.get_or_insert_with(HashMap::new);
			},
		}
	}

	fn now(&self) -> OffsetDateTime {
		clock::truncate_ms(self.clock.now())
	}

	fn claim_now(
		&self,
		key: &LockKey,
		holder: &HolderId,
		ttl: Duration,
	) -> Result<ClaimOutcome, StoreError> {
		let now = self.now();
		let mut guard = self.tables.write();
		let leases = guard.leases_mut()?;

		if leases.get(key).is_some_and(|existing| !existing.is_claimable_by(holder, now)) {
			return Ok(ClaimOutcome::Contended);
		}

		let record = LockRecord {
			lock_key: key.clone(),
			holder: holder.clone(),
			locked_until: now + ttl,
			updated_at: now,
		};

		leases.insert(key.clone(), record.clone());

		Ok(ClaimOutcome::Claimed(record))
	}

	fn expire_now(&self, key: &LockKey, holder: &HolderId) -> Result<bool, StoreError> {
		let now = self.now();
		let mut guard = self.tables.write();

		match guard.leases_mut()?.get_mut(key) {
			Some(record) if &record.holder == holder => {
				record.locked_until = now;
				record.updated_at = now;

				Ok(true)
			},
			_ => Ok(false),
		}
	}

	fn hit_now(
		&self,
		bucket: &str,
		key: &str,
		window: Duration,
	) -> Result<CounterSnapshot, StoreError> {
		let now = self.now();
		let mut guard = self.tables.write();
		let counter = match guard.counters_mut()?.entry((bucket.to_owned(), key.to_owned())) {
			Entry::Occupied(entry) => {
				let counter = entry.into_mut();

				if counter.is_expired_at(now, window) {
					counter.window_start = now;
					counter.count = 1;
				} else {
					counter.count = counter.count.saturating_add(1);
				}

				counter
			},
			Entry::Vacant(entry) => entry.insert(RateLimitCounter {
				bucket: bucket.to_owned(),
				key: key.to_owned(),
				window_start: now,
				count: 1,
			}),
		};

		Ok(CounterSnapshot {
			count: counter.count,
			window_start: counter.window_start,
			observed_at: now,
		})
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}
}
impl Debug for MemoryStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let guard = self.tables.read();

		f.debug_struct("MemoryStore")
			.field("leases", &guard.leases.as_ref().map(HashMap::len))
			.field("counters", &guard.counters.as_ref().map(HashMap::len))
			.finish()
	}
}
impl CoordinationStore for MemoryStore {
	fn table_exists(&self, table: Table) -> StoreFuture<'_, bool> {
		Box::pin(async move {
			let guard = self.tables.read();
			let exists = match table {
				Table::LeaseLocks => guard.leases.is_some(),
				Table::RateLimitCounters => guard.counters.is_some(),
			};

			Ok(exists)
		})
	}

	fn claim_lease<'a>(
		&'a self,
		key: &'a LockKey,
		holder: &'a HolderId,
		ttl: Duration,
	) -> StoreFuture<'a, ClaimOutcome> {
		Box::pin(async move { self.claim_now(key, holder, ttl) })
	}

	fn expire_lease<'a>(
		&'a self,
		key: &'a LockKey,
		holder: &'a HolderId,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { self.expire_now(key, holder) })
	}

	fn fetch_lease<'a>(&'a self, key: &'a LockKey) -> StoreFuture<'a, Option<LockRecord>> {
		Box::pin(async move {
			let guard = self.tables.read();
			let leases =
				guard.leases.as_ref().ok_or_else(|| StoreError::missing_table(Table::LeaseLocks))?;

			Ok(leases.get(key).cloned())
		})
	}

	fn record_hit<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
		window: Duration,
	) -> StoreFuture<'a, CounterSnapshot> {
		Box::pin(async move { self.hit_now(bucket, key, window) })
	}

	fn fetch_counter<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
	) -> StoreFuture<'a, Option<RateLimitCounter>> {
		Box::pin(async move {
			let guard = self.tables.read();
			let counters = guard
				.counters
				.as_ref()
				.ok_or_else(|| StoreError::missing_table(Table::RateLimitCounters))?;

			Ok(counters.get(&(bucket.to_owned(), key.to_owned())).cloned())
		})
	}
}

//! Lease-based distributed lock built on one atomic conditional write.
//!
//! [`LeaseLock::acquire`] issues exactly one conditional write against the `lease_locks` table:
//! insert when the key is unseen, otherwise take over the row only if its lease has expired, was
//! released, or already belongs to the caller. The caller wins iff its own write took effect, so
//! there is no gap between checking and claiming, and any number of processes may race on the
//! same key.
//!
//! Leases are never renewed in the background. A holder whose job outlives its TTL risks a second
//! acquisition by another run, and clock skew between store clients shifts expiry accordingly;
//! size TTLs well above the expected job duration.

mod metrics;

pub use metrics::LeaseMetrics;

// self
use crate::{
	_prelude::*,
	id::{HolderId, LockKey},
	obs::{self, OpKind, OpOutcome, OpSpan},
	record::LockRecord,
	schema::SchemaGuard,
	store::{ClaimOutcome, CoordinationStore, Table},
};

/// Exclusive, self-expiring claim on named resources.
///
/// Mutual exclusion holds across processes sharing the backing store; there is no fairness
/// promise about which of several simultaneous challengers wins.
pub struct LeaseLock {
	store: Arc<dyn CoordinationStore>,
	schema: SchemaGuard,
	metrics: Arc<LeaseMetrics>,
}
impl LeaseLock {
	/// TTL used by callers that have no better estimate of their job duration.
	pub const DEFAULT_TTL: Duration = Duration::seconds(300);

	/// Creates a lock backed by the provided store.
	pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
		Self { store, schema: SchemaGuard::new(Table::LeaseLocks), metrics: Default::default() }
	}

	/// Shared counters for this lock's operations.
	pub fn metrics(&self) -> Arc<LeaseMetrics> {
		self.metrics.clone()
	}

	/// Attempts to take the lease on `key` for `ttl`.
	///
	/// Returns `true` iff this call's write took effect. `false` is the normal "another run is in
	/// progress" answer and performs no mutation. A non-positive `ttl` produces a lease that is
	/// already expired.
	pub async fn acquire(&self, key: &LockKey, holder: &HolderId, ttl: Duration) -> Result<bool> {
		let span = OpSpan::new(OpKind::LeaseAcquire, "acquire");

		let result: Result<bool> = span
			.instrument(async move {
				self.schema.ensure(self.store.as_ref()).await?;
				self.metrics.record_attempt();

				let outcome =
					<dyn CoordinationStore>::claim_lease(self.store.as_ref(), key, holder, ttl)
						.await?;

				match outcome {
					ClaimOutcome::Claimed(_) => {
						self.metrics.record_acquired();

						Ok(true)
					},
					ClaimOutcome::Contended => {
						self.metrics.record_contended();
						obs::lease_contended(key, holder);

						Ok(false)
					},
				}
			})
			.await;

		match &result {
			Ok(true) => span.finish(OpOutcome::Success),
			Ok(false) => span.finish(OpOutcome::Rejected),
			Err(_) => span.finish(OpOutcome::Failure),
		}

		result
	}

	/// Ends the lease early when `holder` still owns it; otherwise does nothing.
	///
	/// Idempotent: releasing twice, or releasing a lease taken over by another run, has no
	/// effect. The row is kept so the key can be reused.
	pub async fn release(&self, key: &LockKey, holder: &HolderId) -> Result<()> {
		let span = OpSpan::new(OpKind::LeaseRelease, "release");

		let result: Result<bool> = span
			.instrument(async move {
				self.schema.ensure(self.store.as_ref()).await?;

				let released =
					<dyn CoordinationStore>::expire_lease(self.store.as_ref(), key, holder).await?;

				if released {
					self.metrics.record_release();
				}

				Ok(released)
			})
			.await;

		match &result {
			Ok(true) => span.finish(OpOutcome::Success),
			Ok(false) => span.finish(OpOutcome::Rejected),
			Err(_) => span.finish(OpOutcome::Failure),
		}

		result.map(|_| ())
	}

	/// Runs `work` while holding the lease, releasing it afterwards whatever `work` returned.
	///
	/// Returns `Ok(None)` without running `work` when another run holds the lease.
	pub async fn run_exclusive<F, Fut, T>(
		&self,
		key: &LockKey,
		holder: &HolderId,
		ttl: Duration,
		work: F,
	) -> Result<Option<T>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		if !self.acquire(key, holder, ttl).await? {
			return Ok(None);
		}

		let output = work().await;

		self.release(key, holder).await?;

		Ok(Some(output))
	}

	/// Returns the current lease row for `key`, if one was ever written.
	pub async fn current(&self, key: &LockKey) -> Result<Option<LockRecord>> {
		self.schema.ensure(self.store.as_ref()).await?;

		Ok(<dyn CoordinationStore>::fetch_lease(self.store.as_ref(), key).await?)
	}
}
impl Debug for LeaseLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeaseLock")
			.field("schema_ready", &self.schema.is_ready())
			.field("metrics", &self.metrics)
			.finish()
	}
}

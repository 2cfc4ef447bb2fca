//! Row models persisted by coordination stores.

// self
use crate::{
	_prelude::*,
	id::{HolderId, LockKey},
};

/// Lease row for one lock key.
///
/// The row is created on the first acquisition attempt and never deleted; a release only moves
/// `locked_until` back to the release instant so the key can be reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
	/// Unique resource name.
	pub lock_key: LockKey,
	/// Run that performed the last successful acquisition.
	pub holder: HolderId,
	/// Absolute expiry instant of the lease.
	pub locked_until: OffsetDateTime,
	/// Instant of the last mutation.
	pub updated_at: OffsetDateTime,
}
impl LockRecord {
	/// Returns `true` while the lease is live at the provided instant.
	pub fn is_active_at(&self, instant: OffsetDateTime) -> bool {
		self.locked_until > instant
	}

	/// Returns `true` when the provided holder may claim the row at `instant`.
	///
	/// An expired or released lease is claimable by anyone; a live lease only by its holder.
	pub fn is_claimable_by(&self, holder: &HolderId, instant: OffsetDateTime) -> bool {
		!self.is_active_at(instant) || &self.holder == holder
	}
}

/// Fixed-window hit counter for one `(bucket, key)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitCounter {
	/// Logical counter namespace.
	pub bucket: String,
	/// Normalized caller key.
	pub key: String,
	/// Start of the current window.
	pub window_start: OffsetDateTime,
	/// Hits observed since `window_start`.
	pub count: u64,
}
impl RateLimitCounter {
	/// Returns `true` once the window has fully elapsed at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime, window: Duration) -> bool {
		instant - self.window_start >= window
	}
}

/// Counter state returned by the atomic hit write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterSnapshot {
	/// Count after this hit was applied.
	pub count: u64,
	/// Window start after this hit was applied.
	pub window_start: OffsetDateTime,
	/// Store-side instant at which the hit was applied.
	pub observed_at: OffsetDateTime,
}

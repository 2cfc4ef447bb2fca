//! Store-side time sources.
//!
//! Lease expiry and rate-limit windows are always evaluated against the clock owned by the
//! backing store, never against the caller's clock.

// self
use crate::_prelude::*;

/// Source of "now" for a backing store.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock; clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock pinned at the provided instant.
	pub fn new(instant: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(instant)))
	}

	/// Moves the clock forward (or backward, for negative durations).
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}

	/// Pins the clock to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

/// Converts an instant into Unix milliseconds, the precision every backend persists.
pub(crate) fn to_unix_ms(instant: OffsetDateTime) -> i64 {
	i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Converts Unix milliseconds back into an instant, saturating at the representable range.
pub(crate) fn from_unix_ms(ms: i64) -> OffsetDateTime {
	OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
		.unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Truncates an instant to millisecond precision.
pub(crate) fn truncate_ms(instant: OffsetDateTime) -> OffsetDateTime {
	from_unix_ms(to_unix_ms(instant))
}

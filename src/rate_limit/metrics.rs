// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for checks issued by one [`RateLimiter`](super::RateLimiter).
#[derive(Debug, Default)]
pub struct RateLimitMetrics {
	allowed: AtomicU64,
	rejected: AtomicU64,
}
impl RateLimitMetrics {
	/// Returns the number of checks that passed.
	pub fn allowed(&self) -> u64 {
		self.allowed.load(Ordering::Relaxed)
	}

	/// Returns the number of checks that exceeded the limit.
	pub fn rejected(&self) -> u64 {
		self.rejected.load(Ordering::Relaxed)
	}

	pub(crate) fn record_allowed(&self) {
		self.allowed.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rejected(&self) {
		self.rejected.fetch_add(1, Ordering::Relaxed);
	}
}

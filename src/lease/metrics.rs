// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for lease operations issued by one [`LeaseLock`](super::LeaseLock).
#[derive(Debug, Default)]
pub struct LeaseMetrics {
	attempts: AtomicU64,
	acquired: AtomicU64,
	contended: AtomicU64,
	releases: AtomicU64,
}
impl LeaseMetrics {
	/// Returns the total number of acquisition attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of attempts whose write took effect.
	pub fn acquired(&self) -> u64 {
		self.acquired.load(Ordering::Relaxed)
	}

	/// Returns the number of attempts that found another live lease.
	pub fn contended(&self) -> u64 {
		self.contended.load(Ordering::Relaxed)
	}

	/// Returns the number of release calls that moved a lease expiry.
	pub fn releases(&self) -> u64 {
		self.releases.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_acquired(&self) {
		self.acquired.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_contended(&self) {
		self.contended.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_release(&self) {
		self.releases.fetch_add(1, Ordering::Relaxed);
	}
}

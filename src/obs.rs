//! Spans, events, and counters for lease, rate-limit, and dispatch calls.
//!
//! Every public operation opens an [`OpSpan`], which is a no-op shell unless a feature is on:
//!
//! - `tracing`: a `rowguard.op` span carrying `op`, `stage`, and `outcome`, plus events for lease
//!   contention, rate-limit rejections, and dispatch item failures.
//! - `metrics`: `rowguard_op_total{op, outcome}` and `rowguard_dispatch_items_total{result}`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the coordination core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// [`LeaseLock::acquire`](crate::lease::LeaseLock::acquire).
	LeaseAcquire,
	/// [`LeaseLock::release`](crate::lease::LeaseLock::release).
	LeaseRelease,
	/// [`RateLimiter::check`](crate::rate_limit::RateLimiter::check).
	RateLimitCheck,
	/// [`ThrottledDispatcher::dispatch`](crate::dispatch::ThrottledDispatcher::dispatch).
	Dispatch,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::LeaseAcquire => "lease_acquire",
			OpKind::LeaseRelease => "lease_release",
			OpKind::RateLimitCheck => "rate_limit_check",
			OpKind::Dispatch => "dispatch",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// The operation completed and its effect applied.
	Success,
	/// The operation completed without effect (lease held elsewhere, rate limited, batch cut
	/// short).
	Rejected,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Rejected => "rejected",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

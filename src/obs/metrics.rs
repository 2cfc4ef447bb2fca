// self
use crate::obs::{OpKind, OpOutcome};

/// Increments `rowguard_op_total{op, outcome}` on the installed recorder, if any.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!("rowguard_op_total", "op" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Adds one batch's per-item results to `rowguard_dispatch_items_total{result}`.
pub fn record_dispatch_items(sent: usize, failed: usize) {
	#[cfg(feature = "metrics")]
	{
		let as_u64 = |n: usize| u64::try_from(n).unwrap_or(u64::MAX);

		metrics::counter!("rowguard_dispatch_items_total", "result" => "sent")
			.increment(as_u64(sent));
		metrics::counter!("rowguard_dispatch_items_total", "result" => "failed")
			.increment(as_u64(failed));
	}
	#[cfg(not(feature = "metrics"))]
	let _ = (sent, failed);
}

// self
use crate::{
	_prelude::*,
	obs::{self, OpKind, OpOutcome},
};

/// Future returned by [`OpSpan::instrument`]; a passthrough when `tracing` is disabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OpSpan::instrument`]; a passthrough when `tracing` is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// Span plus outcome bookkeeping for one public operation call.
///
/// Creating the span counts an attempt; [`OpSpan::finish`] stamps the outcome on both the span's
/// `outcome` field and the `rowguard_op_total` counter.
#[derive(Clone, Debug)]
pub struct OpSpan {
	kind: OpKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens a `rowguard.op` span for `kind` at `stage`.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		obs::record_op_outcome(kind, OpOutcome::Attempt);

		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"rowguard.op",
				op = kind.as_str(),
				stage,
				outcome = tracing::field::Empty,
			);

			Self { kind, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self { kind }
		}
	}

	/// Runs `fut` inside the span; nothing is entered across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			tracing::Instrument::instrument(fut, self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Records how the call ended.
	pub fn finish(&self, outcome: OpOutcome) {
		#[cfg(feature = "tracing")]
		self.span.record("outcome", outcome.as_str());

		obs::record_op_outcome(self.kind, outcome);
	}
}

pub(crate) fn lease_contended(key: &str, holder: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(key, holder, "lease held by another run; skipping cycle");
	#[cfg(not(feature = "tracing"))]
	let _ = (key, holder);
}

pub(crate) fn rate_limited(bucket: &str, key: &str, count: u64, retry_after_ms: u64) {
	#[cfg(feature = "tracing")]
	tracing::info!(bucket, key, count, retry_after_ms, "rate limit exceeded");
	#[cfg(not(feature = "tracing"))]
	let _ = (bucket, key, count, retry_after_ms);
}

pub(crate) fn dispatch_item_failed(index: usize, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(index, error = %error, "dispatch item failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (index, error);
}

pub(crate) fn dispatch_finished(attempted: usize, sent: usize, failed: usize, reason: &str) {
	#[cfg(feature = "tracing")]
	tracing::info!(attempted, sent, failed, reason, "dispatch finished");
	#[cfg(not(feature = "tracing"))]
	let _ = (attempted, sent, failed, reason);

	obs::record_dispatch_items(sent, failed);
}

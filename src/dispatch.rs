//! Sequential, count- and time-bounded batch delivery.
//!
//! [`ThrottledDispatcher::dispatch`] walks items strictly in input order, one at a time, so a
//! downstream system never sees more than one call in flight and at most one call per
//! configured delay. The time budget is cooperative: no item starts once the budget (including
//! the pending inter-item delay) is spent, and an item action that has started always runs to
//! completion.
//!
//! Failures are only isolated when the action returns `Err`. A panicking action is not caught:
//! it unwinds through [`ThrottledDispatcher::dispatch`] and the batch report is lost.
//! Callers resume the remainder in a later invocation when [`DispatchReport::has_more`] is set.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Throughput and budget settings for one dispatch batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
	/// Pause between two consecutive attempted items, in milliseconds.
	#[serde(default)]
	pub delay_ms: u64,
	/// Maximum number of items attempted per batch; unbounded when absent.
	#[serde(default)]
	pub max_items: Option<usize>,
	/// Wall-clock budget for the batch in milliseconds; unbounded when absent.
	#[serde(default)]
	pub max_run_ms: Option<u64>,
}
impl DispatchConfig {
	/// Overrides the inter-item delay.
	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Caps the number of attempted items.
	pub fn with_max_items(mut self, max_items: usize) -> Self {
		self.max_items = Some(max_items);

		self
	}

	/// Caps the wall-clock time spent starting new items.
	pub fn with_max_run(mut self, max_run: StdDuration) -> Self {
		self.max_run_ms = Some(u64::try_from(max_run.as_millis()).unwrap_or(u64::MAX));

		self
	}

	/// Inter-item delay.
	pub fn delay(&self) -> StdDuration {
		StdDuration::from_millis(self.delay_ms)
	}

	/// Time budget, if any.
	pub fn max_run(&self) -> Option<StdDuration> {
		self.max_run_ms.map(StdDuration::from_millis)
	}
}

/// Why a batch stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
	/// Every input item was attempted.
	Exhausted,
	/// `max_items` attempts were made while items remained.
	MaxItems,
	/// The time budget ran out before the next item could start.
	TimeBudget,
}
impl StopReason {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StopReason::Exhausted => "exhausted",
			StopReason::MaxItems => "max_items",
			StopReason::TimeBudget => "time_budget",
		}
	}
}

/// Outcome of one dispatch batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
	/// Items whose action was started.
	pub attempted: usize,
	/// Actions that succeeded.
	pub sent: usize,
	/// Actions that failed.
	pub failed: usize,
	/// The time budget cut the batch short.
	pub stopped_early: bool,
	/// A follow-up batch should resume with the remaining items.
	pub has_more: bool,
	/// Why the batch stopped.
	pub stop_reason: StopReason,
}

/// In-process batch sender that honors a downstream throughput ceiling.
#[derive(Clone, Debug, Default)]
pub struct ThrottledDispatcher {
	config: DispatchConfig,
}
impl ThrottledDispatcher {
	/// Creates a dispatcher with the provided settings.
	pub fn new(config: DispatchConfig) -> Self {
		Self { config }
	}

	/// Active settings.
	pub fn config(&self) -> &DispatchConfig {
		&self.config
	}

	/// Runs `on_item` for items in order until the input, `max_items`, or the time budget runs
	/// out.
	///
	/// `on_item` receives each item with its input index. Failures are counted and logged but
	/// never abort the batch or surface to the caller. Passing a borrowed collection (`&vec`)
	/// lets the returned futures borrow the items.
	pub async fn dispatch<I, F, Fut, E>(&self, items: I, mut on_item: F) -> DispatchReport
	where
		I: IntoIterator,
		I::IntoIter: ExactSizeIterator,
		F: FnMut(I::Item, usize) -> Fut,
		Fut: Future<Output = Result<(), E>>,
		E: Display,
	{
		let span = OpSpan::new(OpKind::Dispatch, "dispatch");

		let report = span
			.instrument(async move {
				let started = Instant::now();
				let items = items.into_iter();
				let total = items.len();
				let max_items = self.config.max_items.unwrap_or(usize::MAX);
				let max_run = self.config.max_run();
				let delay = self.config.delay();
				let (mut attempted, mut sent, mut failed) = (0, 0, 0);
				let mut stop_reason = StopReason::Exhausted;

				for (index, item) in items.enumerate() {
					if attempted >= max_items {
						stop_reason = StopReason::MaxItems;

						break;
					}
					if attempted > 0 {
						// No item may start at or past the budget; the next one starts after `delay`.
						let next_start = started.elapsed().checked_add(delay);

						if max_run.is_some_and(|budget| next_start.is_none_or(|at| at >= budget)) {
							stop_reason = StopReason::TimeBudget;

							break;
						}
						if !delay.is_zero() {
							tokio::time::sleep(delay).await;

							if max_run.is_some_and(|budget| started.elapsed() >= budget) {
								stop_reason = StopReason::TimeBudget;

								break;
							}
						}
					}

					attempted += 1;

					match on_item(item, index).await {
						Ok(()) => sent += 1,
						Err(e) => {
							failed += 1;
							obs::dispatch_item_failed(index, &e);
						},
					}
				}

				let stopped_early = stop_reason == StopReason::TimeBudget;

				obs::dispatch_finished(attempted, sent, failed, stop_reason.as_str());

				DispatchReport {
					attempted,
					sent,
					failed,
					stopped_early,
					has_more: stopped_early || attempted < total,
					stop_reason,
				}
			})
			.await;

		if report.has_more {
			span.finish(OpOutcome::Rejected);
		} else {
			span.finish(OpOutcome::Success);
		}

		report
	}
}

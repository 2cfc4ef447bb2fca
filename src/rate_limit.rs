//! Fixed-window rate limiter backed by one atomic reset-or-increment write per hit.
//!
//! [`RateLimiter::check`] never reads a counter and writes it back separately: the store decides
//! between resetting an elapsed window and incrementing the live one inside the same statement
//! that returns the resulting count, so concurrent callers can never be accepted beyond the
//! limit. The limiter is a pure gate; it does not queue or block callers.

mod key;
mod metrics;

pub use key::normalize_key;
pub use metrics::RateLimitMetrics;

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	record::{CounterSnapshot, RateLimitCounter},
	schema::SchemaGuard,
	store::{CoordinationStore, Table},
};

/// Settings for a [`RateLimiter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
	/// Counter namespace; limiters with different buckets never share counters.
	#[serde(default = "RateLimiterConfig::default_bucket")]
	pub bucket: String,
	/// Maximum normalized key length in characters.
	#[serde(default = "RateLimiterConfig::default_max_key_len")]
	pub max_key_len: usize,
}
impl RateLimiterConfig {
	const DEFAULT_BUCKET: &'static str = "default";
	const DEFAULT_MAX_KEY_LEN: usize = 200;

	/// Overrides the bucket.
	pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
		self.bucket = bucket.into();

		self
	}

	/// Overrides the maximum normalized key length.
	pub fn with_max_key_len(mut self, max_key_len: usize) -> Self {
		self.max_key_len = max_key_len;

		self
	}

	/// Rejects settings that cannot produce a usable counter key.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.bucket.trim().is_empty() {
			return Err(ConfigError::EmptyBucket);
		}
		if self.max_key_len == 0 {
			return Err(ConfigError::ZeroKeyLength);
		}

		Ok(())
	}

	fn default_bucket() -> String {
		Self::DEFAULT_BUCKET.into()
	}

	fn default_max_key_len() -> usize {
		Self::DEFAULT_MAX_KEY_LEN
	}
}
impl Default for RateLimiterConfig {
	fn default() -> Self {
		Self { bucket: Self::default_bucket(), max_key_len: Self::DEFAULT_MAX_KEY_LEN }
	}
}

/// Result emitted by [`RateLimiter::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The hit is within the limit.
	Allow,
	/// The hit exceeded the limit and should be deferred.
	Reject(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` when the caller may proceed.
	pub fn is_ok(&self) -> bool {
		matches!(self, Self::Allow)
	}

	/// Advisory delay in milliseconds for rejected hits.
	pub fn retry_after_ms(&self) -> Option<u64> {
		match self {
			Self::Allow => None,
			Self::Reject(directive) => Some(directive.retry_after_ms()),
		}
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Reject`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Time remaining in the current window, in whole seconds.
	pub retry_after: Duration,
	/// Store-side instant at which the window is expected to reset.
	pub earliest_retry_at: OffsetDateTime,
	/// Hits counted in the window, including the rejected one.
	pub count: u64,
	/// Limit the hit was checked against.
	pub limit: u64,
}
impl RetryDirective {
	/// Returns [`Self::retry_after`] in milliseconds.
	pub fn retry_after_ms(&self) -> u64 {
		u64::try_from(self.retry_after.whole_milliseconds()).unwrap_or_default()
	}
}

/// Fixed-window hit counter keyed by normalized caller keys.
pub struct RateLimiter {
	store: Arc<dyn CoordinationStore>,
	config: RateLimiterConfig,
	schema: SchemaGuard,
	metrics: Arc<RateLimitMetrics>,
}
impl RateLimiter {
	/// Creates a limiter using [`RateLimiterConfig::default`].
	pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
		Self {
			store,
			config: RateLimiterConfig::default(),
			schema: SchemaGuard::new(Table::RateLimitCounters),
			metrics: Default::default(),
		}
	}

	/// Creates a limiter with validated settings.
	pub fn with_config(store: Arc<dyn CoordinationStore>, config: RateLimiterConfig) -> Result<Self> {
		config.validate()?;

		Ok(Self { config, ..Self::new(store) })
	}

	/// Active settings.
	pub fn config(&self) -> &RateLimiterConfig {
		&self.config
	}

	/// Shared counters for this limiter's checks.
	pub fn metrics(&self) -> Arc<RateLimitMetrics> {
		self.metrics.clone()
	}

	/// Records one hit for `key` and decides whether it fits `limit` hits per `window`.
	///
	/// The window is rounded up to whole seconds (minimum one), so the effective window may be
	/// up to a second longer than requested.
	pub async fn check(&self, key: &str, limit: u64, window: Duration) -> Result<RateLimitDecision> {
		let span = OpSpan::new(OpKind::RateLimitCheck, "check");

		let result: Result<RateLimitDecision> = span
			.instrument(async move {
				self.schema.ensure(self.store.as_ref()).await?;

				let key = normalize_key(key, self.config.max_key_len);
				let window = window_seconds(window);
				let snapshot = <dyn CoordinationStore>::record_hit(
					self.store.as_ref(),
					&self.config.bucket,
					&key,
					window,
				)
				.await?;

				if snapshot.count <= limit {
					self.metrics.record_allowed();

					return Ok(RateLimitDecision::Allow);
				}

				let directive = retry_directive(&snapshot, window, limit);

				self.metrics.record_rejected();
				obs::rate_limited(
					&self.config.bucket,
					&key,
					snapshot.count,
					directive.retry_after_ms(),
				);

				Ok(RateLimitDecision::Reject(directive))
			})
			.await;

		match &result {
			Ok(RateLimitDecision::Allow) => span.finish(OpOutcome::Success),
			Ok(RateLimitDecision::Reject(_)) => span.finish(OpOutcome::Rejected),
			Err(_) => span.finish(OpOutcome::Failure),
		}

		result
	}

	/// Returns the stored counter for `key` (normalized first), if any hit was recorded.
	pub async fn counter(&self, key: &str) -> Result<Option<RateLimitCounter>> {
		self.schema.ensure(self.store.as_ref()).await?;

		let key = normalize_key(key, self.config.max_key_len);

		Ok(<dyn CoordinationStore>::fetch_counter(self.store.as_ref(), &self.config.bucket, &key)
			.await?)
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("config", &self.config)
			.field("schema_ready", &self.schema.is_ready())
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Rounds a window up to whole seconds, never below one second.
pub fn window_seconds(window: Duration) -> Duration {
	let millis = window.whole_milliseconds().max(1);
	let seconds = (millis + 999) / 1_000;

	Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
}

fn retry_directive(snapshot: &CounterSnapshot, window: Duration, limit: u64) -> RetryDirective {
	let elapsed = (snapshot.observed_at - snapshot.window_start).whole_seconds();
	let remaining = (window.whole_seconds() - elapsed).max(0);
	let retry_after = Duration::seconds(remaining);

	RetryDirective {
		retry_after,
		earliest_retry_at: snapshot.observed_at + retry_after,
		count: snapshot.count,
		limit,
	}
}

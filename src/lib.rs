//! Lease locks, fixed-window rate limits, and throttled batch dispatch for periodic background
//! work that several independent processes may trigger at once.
//!
//! The only coordination primitive is a single atomic conditional write against a shared
//! relational store ([`store::CoordinationStore`]); no in-process mutex is relied upon to
//! coordinate across instances.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod clock;
pub mod dispatch;
pub mod error;
pub mod id;
pub mod lease;
pub mod obs;
pub mod rate_limit;
pub mod record;
pub mod schema;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use time::macros;
	// self
	use crate::{
		clock::ManualClock,
		id::{HolderId, LockKey},
		store::MemoryStore,
	};

	/// Fixed instant every manual test clock starts from.
	pub const TEST_EPOCH: OffsetDateTime = macros::datetime!(2025-11-10 12:00 UTC);

	/// Builds a manual clock pinned at [`TEST_EPOCH`].
	pub fn test_clock() -> ManualClock {
		ManualClock::new(TEST_EPOCH)
	}

	/// Builds a provisioned in-memory store driven by a manual clock the caller can advance.
	pub fn memory_store_with_clock() -> (Arc<MemoryStore>, ManualClock) {
		let clock = test_clock();
		let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));

		(store, clock)
	}

	/// Builds a lock key fixture.
	pub fn lock_key(value: &str) -> LockKey {
		LockKey::new(value).expect("Lock key fixture should be valid.")
	}

	/// Builds a holder fixture.
	pub fn holder(value: &str) -> HolderId {
		HolderId::new(value).expect("Holder fixture should be valid.")
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(test)] use {color_eyre as _, serde_json as _};

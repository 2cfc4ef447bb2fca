//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::{env, fs, path::Path, path::PathBuf, process, sync::Arc};
// crates.io
use time::{OffsetDateTime, macros};
// self
use rowguard::{
	clock::ManualClock,
	id::{HolderId, LockKey},
	store::MemoryStore,
};

/// Fixed instant every manual test clock starts from.
pub const TEST_EPOCH: OffsetDateTime = macros::datetime!(2025-11-10 12:00 UTC);

pub fn test_clock() -> ManualClock {
	ManualClock::new(TEST_EPOCH)
}

pub fn memory_store_with_clock() -> (Arc<MemoryStore>, ManualClock) {
	let clock = test_clock();
	let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));

	(store, clock)
}

pub fn lock_key(value: &str) -> LockKey {
	LockKey::new(value).expect("Lock key fixture should be valid.")
}

pub fn holder(value: &str) -> HolderId {
	HolderId::new(value).expect("Holder fixture should be valid.")
}

pub fn temp_sqlite_path(label: &str) -> PathBuf {
	let unique = format!(
		"rowguard_it_{label}_{}_{}.db",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}

pub fn remove_sqlite_files(path: &Path) {
	for suffix in ["", "-wal", "-shm"] {
		let _ = fs::remove_file(format!("{}{suffix}", path.display()));
	}
}

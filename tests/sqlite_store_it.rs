#![cfg(feature = "sqlite")]

mod common;

// std
use std::{path::Path, sync::Arc};
// self
use common::{holder, lock_key, remove_sqlite_files, temp_sqlite_path, test_clock};
use rowguard::{
	clock::{Clock, ManualClock},
	lease::LeaseLock,
	rate_limit::RateLimiter,
	store::{CoordinationStore, SqliteJournalMode, SqliteStore, SqliteStoreConfig, Table},
};
use time::Duration;

fn open_stores(path: &Path, count: usize, clock: &ManualClock) -> Vec<Arc<SqliteStore>> {
	(0..count)
		.map(|_| {
			Arc::new(
				SqliteStore::open_with_clock(SqliteStoreConfig::new(path), Arc::new(clock.clone()))
					.expect("SQLite store should open."),
			)
		})
		.collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_winner_across_connections() {
	let path = temp_sqlite_path("lease_race");
	let clock = test_clock();
	let stores = open_stores(&path, 8, &clock);

	stores[0].migrate().expect("Migration should succeed.");

	let mut tasks = Vec::new();

	for (i, store) in stores.iter().enumerate() {
		let lock = LeaseLock::new(store.clone());

		tasks.push(tokio::spawn(async move {
			let run = holder(&format!("run-{i}"));

			lock.acquire(&lock_key("reminders-daily"), &run, Duration::seconds(60))
				.await
				.expect("Acquire should not error under contention.")
		}));
	}

	let mut winners = 0;

	for task in tasks {
		if task.await.expect("Acquire task should not panic.") {
			winners += 1;
		}
	}

	assert_eq!(winners, 1);

	drop(stores);
	remove_sqlite_files(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rate_limit_race_across_connections() {
	let path = temp_sqlite_path("rate_race");
	let clock = test_clock();
	let stores = open_stores(&path, 6, &clock);
	let limit = 10;

	stores[0].migrate().expect("Migration should succeed.");

	let mut tasks = Vec::new();

	for store in &stores {
		let limiter = Arc::new(RateLimiter::new(store.clone()));

		for _ in 0..5 {
			let limiter = limiter.clone();

			tasks.push(tokio::spawn(async move {
				limiter
					.check("User@Example.com", limit, Duration::seconds(60))
					.await
					.expect("Check should not error under contention.")
					.is_ok()
			}));
		}
	}

	let mut accepted = 0;

	for task in tasks {
		if task.await.expect("Check task should not panic.") {
			accepted += 1;
		}
	}

	let counter = stores[0]
		.fetch_counter("default", "user@example.com")
		.await
		.expect("Counter lookup should succeed.")
		.expect("Counter row should exist.");

	assert_eq!(accepted, limit);
	assert_eq!(counter.count, 30);

	drop(stores);
	remove_sqlite_files(&path);
}

#[tokio::test]
async fn release_and_expiry_are_visible_to_other_connections() {
	let path = temp_sqlite_path("release");
	let clock = test_clock();
	let stores = open_stores(&path, 2, &clock);

	stores[0].migrate().expect("Migration should succeed.");

	let first = LeaseLock::new(stores[0].clone());
	let second = LeaseLock::new(stores[1].clone());
	let key = lock_key("reminders-daily");
	let (a, b) = (holder("run-a"), holder("run-b"));

	assert!(first.acquire(&key, &a, Duration::seconds(60)).await.expect("acquire"));
	assert!(!second.acquire(&key, &b, Duration::seconds(60)).await.expect("acquire"));

	// Foreign release leaves the lease untouched.
	second.release(&key, &b).await.expect("Foreign release should not error.");

	assert!(!second.acquire(&key, &b, Duration::seconds(60)).await.expect("acquire"));

	first.release(&key, &a).await.expect("Owner release should succeed.");

	let released = second.current(&key).await.expect("current").expect("Row should persist.");

	assert_eq!(released.locked_until, clock.now());
	assert!(second.acquire(&key, &b, Duration::seconds(60)).await.expect("acquire"));

	clock.advance(Duration::seconds(60));

	assert!(first.acquire(&key, &a, Duration::seconds(60)).await.expect("acquire"));

	drop((first, second, stores));
	remove_sqlite_files(&path);
}

#[tokio::test]
async fn migration_is_idempotent_and_reopens_keep_rows() {
	let path = temp_sqlite_path("reopen");
	let clock = test_clock();
	let config = SqliteStoreConfig::new(&path).with_journal_mode(SqliteJournalMode::Delete);
	let store = SqliteStore::open_with_clock(config.clone(), Arc::new(clock.clone()))
		.expect("SQLite store should open.");

	assert_eq!(store.table_exists(Table::RateLimitCounters).await, Ok(false));

	store.migrate().expect("Migration should succeed.");
	store.migrate().expect("Repeated migration should be a no-op.");
	store.record_hit("default", "k", Duration::seconds(60)).await.expect("Hit should land.");

	drop(store);

	let reopened = SqliteStore::open_with_clock(config, Arc::new(clock.clone()))
		.expect("SQLite store should reopen.");
	let counter = reopened
		.fetch_counter("default", "k")
		.await
		.expect("Counter lookup should succeed.")
		.expect("Counter row should survive a reopen.");

	assert_eq!(counter.count, 1);
	assert_eq!(reopened.path(), path.as_path());

	drop(reopened);
	remove_sqlite_files(&path);
}

#[tokio::test]
async fn unmigrated_file_surfaces_schema_not_ready() {
	let path = temp_sqlite_path("unmigrated");
	let store = Arc::new(
		SqliteStore::open_with_clock(SqliteStoreConfig::new(&path), Arc::new(test_clock()))
			.expect("SQLite store should open."),
	);
	let lock = LeaseLock::new(store.clone());
	let err = lock
		.acquire(&lock_key("k"), &holder("run-a"), Duration::seconds(1))
		.await
		.expect_err("Acquire must fail before migration.");

	assert!(err.is_schema_not_ready());

	store.migrate().expect("Migration should succeed.");

	assert!(
		lock.acquire(&lock_key("k"), &holder("run-a"), Duration::seconds(1)).await.expect("acquire")
	);

	drop((lock, store));
	remove_sqlite_files(&path);
}

#[tokio::test]
async fn busy_writer_does_not_stall_the_runtime() {
	let path = temp_sqlite_path("busy");
	let clock = test_clock();
	let store = Arc::new(
		SqliteStore::open_with_clock(
			SqliteStoreConfig::new(&path).with_busy_timeout_ms(5_000),
			Arc::new(clock.clone()),
		)
		.expect("SQLite store should open."),
	);

	store.migrate().expect("Migration should succeed.");

	// Another process holds the write lock for a while.
	let blocker = rusqlite::Connection::open(&path).expect("Raw connection should open.");

	blocker.execute_batch("BEGIN IMMEDIATE;").expect("Write lock should be taken.");

	let holder_thread = std::thread::spawn(move || {
		std::thread::sleep(std::time::Duration::from_millis(400));
		blocker.execute_batch("COMMIT;").expect("Write lock should be released.");
	});
	let lock = LeaseLock::new(store.clone());
	let claim = tokio::spawn(async move {
		lock.acquire(&lock_key("reminders-daily"), &holder("run-a"), Duration::seconds(60)).await
	});
	let tick_started = std::time::Instant::now();

	tokio::time::sleep(std::time::Duration::from_millis(20)).await;

	let tick = tick_started.elapsed();

	assert!(tick < std::time::Duration::from_millis(300), "timer task stalled for {tick:?}");
	assert!(
		claim
			.await
			.expect("Claim task should not panic.")
			.expect("Claim should succeed once the lock is released.")
	);

	holder_thread.join().expect("Lock holder thread should not panic.");
	drop(store);
	remove_sqlite_files(&path);
}

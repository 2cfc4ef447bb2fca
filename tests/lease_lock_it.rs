mod common;

// std
use std::sync::Arc;
// self
use common::{holder, lock_key, memory_store_with_clock, test_clock};
use rowguard::{
	clock::Clock,
	error::Error,
	lease::LeaseLock,
	store::{CoordinationStore, MemoryStore, Table},
};
use time::Duration;

#[tokio::test]
async fn live_lease_excludes_other_holders() {
	let (store, _clock) = memory_store_with_clock();
	let lock = LeaseLock::new(store);
	let key = lock_key("reminders-daily");

	assert!(lock.acquire(&key, &holder("run-a"), Duration::seconds(60)).await.expect("acquire"));

	for challenger in ["run-b", "run-c", "run-d"] {
		assert!(
			!lock
				.acquire(&key, &holder(challenger), Duration::seconds(60))
				.await
				.expect("Contended acquire should not error."),
			"{challenger} must not take a live lease"
		);
	}
}

#[tokio::test]
async fn live_holder_may_reacquire_and_extend() {
	let (store, clock) = memory_store_with_clock();
	let lock = LeaseLock::new(store);
	let key = lock_key("reminders-daily");
	let run = holder("run-a");

	assert!(lock.acquire(&key, &run, Duration::seconds(60)).await.expect("acquire"));

	clock.advance(Duration::seconds(30));

	assert!(lock.acquire(&key, &run, Duration::seconds(60)).await.expect("re-acquire"));

	let record = lock.current(&key).await.expect("current").expect("Lease row should exist.");

	assert_eq!(record.locked_until, clock.now() + Duration::seconds(60));
}

#[tokio::test]
async fn concurrent_challengers_yield_exactly_one_winner() {
	let (store, _clock) = memory_store_with_clock();
	let mut tasks = Vec::new();

	for idx in 0..24 {
		// One lock instance per task, as separate processes would have.
		let lock = LeaseLock::new(store.clone());

		tasks.push(tokio::spawn(async move {
			lock.acquire(
				&lock_key("reminders-daily"),
				&holder(&format!("run-{idx}")),
				Duration::seconds(60),
			)
			.await
			.expect("Concurrent acquire should not error.")
		}));
	}

	let mut winners = 0;

	for task in tasks {
		if task.await.expect("Acquire task should not panic.") {
			winners += 1;
		}
	}

	assert_eq!(winners, 1);
}

#[tokio::test]
async fn expired_lease_is_taken_over() {
	let (store, clock) = memory_store_with_clock();
	let lock = LeaseLock::new(store);
	let key = lock_key("reminders-daily");

	assert!(lock.acquire(&key, &holder("run-a"), Duration::seconds(60)).await.expect("acquire"));

	clock.advance(Duration::seconds(59));

	assert!(!lock.acquire(&key, &holder("run-b"), Duration::seconds(60)).await.expect("acquire"));

	clock.advance(Duration::seconds(1));

	assert!(lock.acquire(&key, &holder("run-b"), Duration::seconds(60)).await.expect("acquire"));

	let record = lock.current(&key).await.expect("current").expect("Lease row should exist.");

	assert_eq!(record.holder, holder("run-b"));
	assert_eq!(record.locked_until, clock.now() + Duration::seconds(60));
}

#[tokio::test]
async fn release_by_foreign_holder_is_a_noop() {
	let (store, clock) = memory_store_with_clock();
	let lock = LeaseLock::new(store);
	let key = lock_key("reminders-daily");
	let owner = holder("run-y");

	assert!(lock.acquire(&key, &owner, Duration::seconds(60)).await.expect("acquire"));

	let before = lock.current(&key).await.expect("current");

	clock.advance(Duration::seconds(1));
	lock.release(&key, &holder("run-x")).await.expect("Foreign release should not error.");

	assert_eq!(lock.current(&key).await.expect("current"), before);
	assert!(!lock.acquire(&key, &holder("run-z"), Duration::seconds(60)).await.expect("acquire"));
}

#[tokio::test]
async fn release_by_owner_allows_immediate_reacquisition() {
	let (store, clock) = memory_store_with_clock();
	let lock = LeaseLock::new(store);
	let key = lock_key("reminders-daily");
	let owner = holder("run-y");

	assert!(lock.acquire(&key, &owner, Duration::seconds(60)).await.expect("acquire"));

	lock.release(&key, &owner).await.expect("Owner release should succeed.");
	lock.release(&key, &owner).await.expect("Second release should be a no-op.");

	let record = lock.current(&key).await.expect("current").expect("Released rows are kept.");

	assert_eq!(record.locked_until, clock.now());
	assert!(lock.acquire(&key, &holder("run-z"), Duration::seconds(60)).await.expect("acquire"));
}

#[tokio::test]
async fn releasing_unknown_key_has_no_effect() {
	let (store, _clock) = memory_store_with_clock();
	let lock = LeaseLock::new(store.clone());
	let key = lock_key("never-acquired");

	lock.release(&key, &holder("run-a")).await.expect("Release should not error.");

	assert!(store.fetch_lease(&key).await.expect("fetch").is_none());
}

#[tokio::test]
async fn missing_table_surfaces_schema_not_ready() {
	let store = Arc::new(MemoryStore::unprovisioned(Arc::new(test_clock())));
	let lock = LeaseLock::new(store.clone());
	let key = lock_key("reminders-daily");
	let run = holder("run-a");
	let acquire_err = lock
		.acquire(&key, &run, LeaseLock::DEFAULT_TTL)
		.await
		.expect_err("Acquire must not treat a missing table as a free lock.");
	let release_err =
		lock.release(&key, &run).await.expect_err("Release must report the missing table.");

	assert!(matches!(acquire_err, Error::SchemaNotReady { table: "lease_locks" }));
	assert!(release_err.is_schema_not_ready());

	store.provision(Table::LeaseLocks);

	assert!(lock.acquire(&key, &run, LeaseLock::DEFAULT_TTL).await.expect("acquire"));
}

#[tokio::test]
async fn run_exclusive_releases_after_work() {
	let (store, _clock) = memory_store_with_clock();
	let lock = LeaseLock::new(store);
	let key = lock_key("reminders-daily");
	let output = lock
		.run_exclusive(&key, &holder("run-a"), LeaseLock::DEFAULT_TTL, || async { "sent" })
		.await
		.expect("Exclusive run should succeed.");

	assert_eq!(output, Some("sent"));
	assert!(
		lock.acquire(&key, &holder("run-b"), LeaseLock::DEFAULT_TTL).await.expect("acquire"),
		"lease should be released once the work finished"
	);
}

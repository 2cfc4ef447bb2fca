//! SQLite-backed [`CoordinationStore`] shared by independent processes through one database file.
//!
//! Each [`SqliteStore`] owns a single connection. Every mutation is one `INSERT .. ON CONFLICT ..
//! DO UPDATE .. WHERE .. RETURNING` (or guarded `UPDATE`) statement, so the guard and the write
//! are evaluated atomically by SQLite regardless of how many processes share the file.

// std
use std::path::{Path, PathBuf};
// crates.io
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
// self
use crate::{
	_prelude::*,
	clock::{self, Clock, SystemClock},
	error::ConfigError,
	id::{HolderId, LockKey},
	record::{CounterSnapshot, LockRecord, RateLimitCounter},
	store::{ClaimOutcome, CoordinationStore, StoreError, StoreFuture, Table},
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS lease_locks (
	lock_key TEXT PRIMARY KEY NOT NULL,
	holder TEXT NOT NULL,
	locked_until_ms INTEGER NOT NULL,
	updated_at_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS rate_limit_counters (
	bucket TEXT NOT NULL,
	limit_key TEXT NOT NULL,
	window_start_ms INTEGER NOT NULL,
	count INTEGER NOT NULL,
	PRIMARY KEY (bucket, limit_key)
);
";
const CLAIM_LEASE: &str = "
INSERT INTO lease_locks (lock_key, holder, locked_until_ms, updated_at_ms)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(lock_key) DO UPDATE SET
	holder = excluded.holder,
	locked_until_ms = excluded.locked_until_ms,
	updated_at_ms = excluded.updated_at_ms
WHERE lease_locks.locked_until_ms <= excluded.updated_at_ms
	OR lease_locks.holder = excluded.holder
RETURNING holder, locked_until_ms, updated_at_ms
";
const EXPIRE_LEASE: &str = "
UPDATE lease_locks SET locked_until_ms = ?3, updated_at_ms = ?3
WHERE lock_key = ?1 AND holder = ?2
";
const FETCH_LEASE: &str =
	"SELECT holder, locked_until_ms, updated_at_ms FROM lease_locks WHERE lock_key = ?1";
// Every right-hand side of an upsert SET clause reads the pre-update row.
const RECORD_HIT: &str = "
INSERT INTO rate_limit_counters (bucket, limit_key, window_start_ms, count)
VALUES (?1, ?2, ?3, 1)
ON CONFLICT(bucket, limit_key) DO UPDATE SET
	count = CASE
		WHEN ?3 - rate_limit_counters.window_start_ms >= ?4 THEN 1
		ELSE rate_limit_counters.count + 1
	END,
	window_start_ms = CASE
		WHEN ?3 - rate_limit_counters.window_start_ms >= ?4 THEN ?3
		ELSE rate_limit_counters.window_start_ms
	END
RETURNING count, window_start_ms
";
const FETCH_COUNTER: &str = "
SELECT window_start_ms, count FROM rate_limit_counters WHERE bucket = ?1 AND limit_key = ?2
";
const TABLE_EXISTS: &str = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite journal mode applied when a connection opens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
	/// Write-ahead logging; lets readers proceed while a writer holds the lock.
	#[default]
	Wal,
	/// Rollback journal.
	Delete,
}
impl SqliteJournalMode {
	/// Returns the `journal_mode` pragma value.
	pub const fn pragma_value(self) -> &'static str {
		match self {
			Self::Wal => "wal",
			Self::Delete => "delete",
		}
	}
}

/// Connection settings for [`SqliteStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
	/// Database file shared by every participating process.
	pub path: PathBuf,
	/// How long a writer waits on a locked database before failing.
	#[serde(default = "default_busy_timeout_ms")]
	pub busy_timeout_ms: u64,
	/// Journal mode applied on open.
	#[serde(default)]
	pub journal_mode: SqliteJournalMode,
}
impl SqliteStoreConfig {
	/// Creates settings for the provided database path.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
			journal_mode: SqliteJournalMode::default(),
		}
	}

	/// Overrides the busy timeout.
	pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
		self.busy_timeout_ms = busy_timeout_ms;

		self
	}

	/// Overrides the journal mode.
	pub fn with_journal_mode(mut self, journal_mode: SqliteJournalMode) -> Self {
		self.journal_mode = journal_mode;

		self
	}
}

const fn default_busy_timeout_ms() -> u64 {
	DEFAULT_BUSY_TIMEOUT_MS
}

/// Coordination store persisted in a SQLite database file.
///
/// Statements block while SQLite waits out `busy_timeout_ms` on a locked file, so every store
/// operation runs on tokio's blocking pool and must be awaited inside a tokio runtime.
pub struct SqliteStore {
	path: PathBuf,
	shared: Arc<Shared>,
}
impl SqliteStore {
	/// Opens (or creates) the database using the wall clock.
	pub fn open(config: SqliteStoreConfig) -> Result<Self> {
		Self::open_with_clock(config, Arc::new(SystemClock))
	}

	/// Opens (or creates) the database using the provided clock.
	pub fn open_with_clock(config: SqliteStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
		let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
			| OpenFlags::SQLITE_OPEN_CREATE
			| OpenFlags::SQLITE_OPEN_NO_MUTEX;
		let conn = Connection::open_with_flags(&config.path, flags).map_err(|e| {
			StoreError::Backend {
				message: format!("Failed to open {}: {e}", config.path.display()),
			}
		})?;

		Self::apply_pragmas(&conn, &config)?;

		Ok(Self { path: config.path, shared: Arc::new(Shared { conn: Mutex::new(conn), clock }) })
	}

	/// Creates both coordination tables if they do not exist.
	pub fn migrate(&self) -> Result<(), StoreError> {
		self.shared.conn.lock().execute_batch(SCHEMA).map_err(|e| StoreError::Backend {
			message: format!("Failed to migrate {}: {e}", self.path.display()),
		})
	}

	/// Returns the database path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn apply_pragmas(conn: &Connection, config: &SqliteStoreConfig) -> Result<(), ConfigError> {
		// Set first so the journal switch itself waits on concurrent openers.
		conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
			.map_err(|e| ConfigError::Sqlite { message: format!("busy_timeout: {e}") })?;
		conn.execute_batch(&format!(
			"PRAGMA journal_mode = {};",
			config.journal_mode.pragma_value()
		))
		.map_err(|e| ConfigError::Sqlite { message: format!("journal_mode: {e}") })
	}

	fn blocking<T, F>(&self, op: F) -> StoreFuture<'static, T>
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(&Shared) -> Result<T, StoreError>,
	{
		let shared = self.shared.clone();

		Box::pin(async move {
			tokio::task::spawn_blocking(move || op(&shared)).await.map_err(|e| {
				StoreError::Backend { message: format!("SQLite worker did not finish: {e}") }
			})?
		})
	}
}

// Connection state moved onto the blocking pool for each operation.
struct Shared {
	conn: Mutex<Connection>,
	clock: Arc<dyn Clock>,
}
impl Shared {
	fn now(&self) -> OffsetDateTime {
		clock::truncate_ms(self.clock.now())
	}

	fn claim_now(
		&self,
		key: &LockKey,
		holder: &HolderId,
		ttl: Duration,
	) -> Result<ClaimOutcome, StoreError> {
		let now = self.now();
		let locked_until = clock::to_unix_ms(now + ttl);
		let row = self
			.conn
			.lock()
			.query_row(
				CLAIM_LEASE,
				params![key.as_str(), holder.as_str(), locked_until, clock::to_unix_ms(now)],
				|row| {
					Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
				},
			)
			.optional()
			.map_err(map_sqlite_err(Table::LeaseLocks))?;

		match row {
			Some((holder, locked_until_ms, updated_at_ms)) => Ok(ClaimOutcome::Claimed(
				lock_record(key, holder, locked_until_ms, updated_at_ms)?,
			)),
			None => Ok(ClaimOutcome::Contended),
		}
	}

	fn expire_now(&self, key: &LockKey, holder: &HolderId) -> Result<bool, StoreError> {
		let now = clock::to_unix_ms(self.now());
		let changed = self
			.conn
			.lock()
			.execute(EXPIRE_LEASE, params![key.as_str(), holder.as_str(), now])
			.map_err(map_sqlite_err(Table::LeaseLocks))?;

		Ok(changed > 0)
	}

	fn fetch_lease_now(&self, key: &LockKey) -> Result<Option<LockRecord>, StoreError> {
		let row = self
			.conn
			.lock()
			.query_row(FETCH_LEASE, params![key.as_str()], |row| {
				Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
			})
			.optional()
			.map_err(map_sqlite_err(Table::LeaseLocks))?;

		row.map(|(holder, locked_until_ms, updated_at_ms)| {
			lock_record(key, holder, locked_until_ms, updated_at_ms)
		})
		.transpose()
	}

	fn hit_now(
		&self,
		bucket: &str,
		key: &str,
		window: Duration,
	) -> Result<CounterSnapshot, StoreError> {
		let now = self.now();
		let window_ms = i64::try_from(window.whole_milliseconds()).unwrap_or(i64::MAX);
		let (count, window_start_ms) = self
			.conn
			.lock()
			.query_row(
				RECORD_HIT,
				params![bucket, key, clock::to_unix_ms(now), window_ms],
				|row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
			)
			.map_err(map_sqlite_err(Table::RateLimitCounters))?;

		Ok(CounterSnapshot {
			count: u64::try_from(count).unwrap_or_default(),
			window_start: clock::from_unix_ms(window_start_ms),
			observed_at: now,
		})
	}

	fn fetch_counter_now(
		&self,
		bucket: &str,
		key: &str,
	) -> Result<Option<RateLimitCounter>, StoreError> {
		let row = self
			.conn
			.lock()
			.query_row(FETCH_COUNTER, params![bucket, key], |row| {
				Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
			})
			.optional()
			.map_err(map_sqlite_err(Table::RateLimitCounters))?;

		Ok(row.map(|(window_start_ms, count)| RateLimitCounter {
			bucket: bucket.to_owned(),
			key: key.to_owned(),
			window_start: clock::from_unix_ms(window_start_ms),
			count: u64::try_from(count).unwrap_or_default(),
		}))
	}

	fn table_exists_now(&self, table: Table) -> Result<bool, StoreError> {
		let count = self
			.conn
			.lock()
			.query_row(TABLE_EXISTS, params![table.as_str()], |row| row.get::<_, i64>(0))
			.map_err(|e| StoreError::Backend {
				message: format!("Failed to inspect table {table}: {e}"),
			})?;

		Ok(count > 0)
	}
}
impl Debug for SqliteStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SqliteStore").field("path", &self.path).finish()
	}
}
impl CoordinationStore for SqliteStore {
	fn table_exists(&self, table: Table) -> StoreFuture<'_, bool> {
		self.blocking(move |shared| shared.table_exists_now(table))
	}

	fn claim_lease<'a>(
		&'a self,
		key: &'a LockKey,
		holder: &'a HolderId,
		ttl: Duration,
	) -> StoreFuture<'a, ClaimOutcome> {
		let (key, holder) = (key.clone(), holder.clone());

		self.blocking(move |shared| shared.claim_now(&key, &holder, ttl))
	}

	fn expire_lease<'a>(
		&'a self,
		key: &'a LockKey,
		holder: &'a HolderId,
	) -> StoreFuture<'a, bool> {
		let (key, holder) = (key.clone(), holder.clone());

		self.blocking(move |shared| shared.expire_now(&key, &holder))
	}

	fn fetch_lease<'a>(&'a self, key: &'a LockKey) -> StoreFuture<'a, Option<LockRecord>> {
		let key = key.clone();

		self.blocking(move |shared| shared.fetch_lease_now(&key))
	}

	fn record_hit<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
		window: Duration,
	) -> StoreFuture<'a, CounterSnapshot> {
		let (bucket, key) = (bucket.to_owned(), key.to_owned());

		self.blocking(move |shared| shared.hit_now(&bucket, &key, window))
	}

	fn fetch_counter<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
	) -> StoreFuture<'a, Option<RateLimitCounter>> {
		let (bucket, key) = (bucket.to_owned(), key.to_owned());

		self.blocking(move |shared| shared.fetch_counter_now(&bucket, &key))
	}
}

fn lock_record(
	key: &LockKey,
	holder: String,
	locked_until_ms: i64,
	updated_at_ms: i64,
) -> Result<LockRecord, StoreError> {
	let holder = HolderId::new(&holder).map_err(|e| StoreError::Backend {
		message: format!("Stored holder for {key} is invalid: {e}"),
	})?;

	Ok(LockRecord {
		lock_key: key.clone(),
		holder,
		locked_until: clock::from_unix_ms(locked_until_ms),
		updated_at: clock::from_unix_ms(updated_at_ms),
	})
}

fn map_sqlite_err(table: Table) -> impl Fn(rusqlite::Error) -> StoreError {
	move |e| match &e {
		rusqlite::Error::SqliteFailure(_, Some(message))
			if message.starts_with("no such table") =>
			StoreError::missing_table(table),
		_ => StoreError::Backend { message: format!("{table}: {e}") },
	}
}

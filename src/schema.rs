//! One-time schema readiness checks owned by each component.

// crates.io
use async_lock::OnceCell;
// self
use crate::{
	_prelude::*,
	store::{CoordinationStore, Table},
};

/// Verifies that a backing table exists before a component touches it.
///
/// A positive probe is cached for the guard's lifetime; a negative probe is not, so a process
/// started before migrations ran recovers once the table appears. Concurrent first callers
/// share a single probe.
#[derive(Debug)]
pub struct SchemaGuard {
	table: Table,
	ready: OnceCell<()>,
}
impl SchemaGuard {
	/// Creates a guard for the provided table.
	pub fn new(table: Table) -> Self {
		Self { table, ready: OnceCell::new() }
	}

	/// Returns the guarded table.
	pub fn table(&self) -> Table {
		self.table
	}

	/// Returns `true` once a probe has confirmed the table.
	pub fn is_ready(&self) -> bool {
		self.ready.is_initialized()
	}

	/// Probes the store unless the table was already confirmed.
	///
	/// Fails with [`Error::SchemaNotReady`] when the table is absent; other store failures
	/// propagate unchanged.
	pub async fn ensure(&self, store: &dyn CoordinationStore) -> Result<()> {
		self.ready
			.get_or_try_init(|| async {
				if store.table_exists(self.table).await? {
					Ok(())
				} else {
					Err(Error::SchemaNotReady { table: self.table.as_str() })
				}
			})
			.await?;

		Ok(())
	}
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core storage backend trait for Tabula.
//
// Defines the `StorageBackend` trait that every engine adapter implements.
// The facade holds a `Box<dyn StorageBackend>` and never knows which engine
// it is talking to. Keys and values are text at this boundary; adapters
// encode them however their engine wants.
//
// Iteration is keyset-paginated: `scan` and `seek_index` return up to `limit`
// records whose primary key sorts strictly after `after`. All engines order
// primary keys by their UTF-8 bytes, so a scan yields the same sequence
// whichever engine produced it. Cursor state lives above this trait, in
// `crate::cursor`.

use std::fmt;
use std::sync::Arc;

use crate::error::{DataError, DataResult};

/// A `(primary key, value)` pair.
pub type Record = (String, String);

/// Derives the secondary key of a record from its primary key and value.
///
/// Returning `None` leaves the record out of the index.
pub type KeyDeriver = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// How an index obtains the secondary key of each record.
#[derive(Clone)]
pub enum IndexKind {
    /// Computed by a function on every write and maintained by the engine.
    Derived(KeyDeriver),
    /// Stored in a column that the caller populates explicitly with
    /// [`crate::TableRef::put_indexed`].
    Column,
}

impl IndexKind {
    /// Convenience constructor for [`IndexKind::Derived`].
    pub fn derived<F>(derive: F) -> Self
    where
        F: Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    {
        IndexKind::Derived(Arc::new(derive))
    }

    /// Short label used in logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            IndexKind::Derived(_) => "derived",
            IndexKind::Column => "column",
        }
    }
}

impl fmt::Debug for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A pluggable storage engine.
///
/// Every method that names a table may assume [`StorageBackend::open_table`]
/// has already been called for it; the facade guarantees this.
pub trait StorageBackend: Send {
    /// Human-readable engine name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Open `table`, provisioning it if it does not exist yet.
    fn open_table(&mut self, table: &str) -> DataResult<()>;

    /// Insert `key` or overwrite its value.
    fn put(&mut self, table: &str, key: &str, value: &str) -> DataResult<()>;

    /// Upsert `key`, then set manually maintained index columns on it.
    ///
    /// Engines without column indexes only accept an empty `columns`.
    fn put_indexed(
        &mut self,
        table: &str,
        key: &str,
        value: &str,
        columns: &[(&str, &str)],
    ) -> DataResult<()> {
        if !columns.is_empty() {
            return Err(DataError::unsupported(self.name(), "manual index columns"));
        }
        self.put(table, key, value)
    }

    /// Look up `key`. A missing key is `Ok(None)`, never an error.
    fn get(&self, table: &str, key: &str) -> DataResult<Option<String>>;

    /// Remove `key`, returning whether it existed.
    fn delete(&mut self, table: &str, key: &str) -> DataResult<bool>;

    /// Total number of records in `table`.
    fn count(&self, table: &str) -> DataResult<u64>;

    /// Run the engine's structural integrity check for `table`.
    fn verify(&mut self, table: &str) -> DataResult<()>;

    /// Up to `limit` records with primary key strictly after `after`, in key order.
    fn scan(&self, table: &str, after: Option<&str>, limit: usize) -> DataResult<Vec<Record>>;

    /// Register secondary index `index` on `table`.
    fn add_index(&mut self, table: &str, index: &str, kind: IndexKind) -> DataResult<()>;

    /// Up to `limit` records whose secondary key equals `selector` exactly and
    /// whose primary key sorts strictly after `after`, in primary key order.
    fn seek_index(
        &self,
        table: &str,
        index: &str,
        selector: &str,
        after: Option<&str>,
        limit: usize,
    ) -> DataResult<Vec<Record>>;

    /// Number of index entries, all of them or only those matching `selector`.
    fn count_index(&self, table: &str, index: &str, selector: Option<&str>) -> DataResult<u64>;

    /// Make buffered writes durable.
    fn commit(&mut self) -> DataResult<()>;

    /// Release the engine. Called once, after a final [`StorageBackend::commit`].
    fn close(self: Box<Self>) -> DataResult<()>;
}

/// Check a table or index name.
///
/// Names become file names and SQL identifiers, so they are limited to ASCII
/// letters, digits and underscores. The `__` prefix is reserved for engine
/// bookkeeping files and `sqlite_` for SQLite internals.
pub fn validate_name(name: &str) -> DataResult<()> {
    if name.is_empty() {
        return Err(DataError::InvalidName("name must not be empty".to_string()));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(DataError::InvalidName(format!(
            "'{name}' may only contain ASCII letters, digits and '_'"
        )));
    }
    if name.starts_with("__") {
        return Err(DataError::InvalidName(format!(
            "'{name}' uses the reserved '__' prefix"
        )));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(DataError::InvalidName(format!(
            "'{name}' uses the reserved 'sqlite_' prefix"
        )));
    }
    Ok(())
}

/// Error for a name that matches an existing table or file except for
/// letter case.
///
/// SQLite identifiers and some filesystems ignore case, so two such names
/// would reach the same relation or file on one engine and two on another.
pub(crate) fn case_conflict(name: &str, existing: &str) -> DataError {
    DataError::InvalidName(format!(
        "'{name}' differs from existing '{existing}' only in letter case"
    ))
}

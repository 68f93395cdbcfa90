// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite-backed relational storage engine for Tabula.
//
// Uses rusqlite with the bundled SQLite amalgamation, so no system library
// is required.
//
// # Storage Design
//
// All tables share one database file, `<root>/<relational_file>`. A table
// is a relation `(key TEXT PRIMARY KEY, value TEXT)`. An index is an extra
// TEXT column added with `ALTER TABLE`, plus a SQL index named
// `"<table>:<column>"` over it. Index columns are never derived: callers
// populate them through `put_indexed`, and lookups match the column value
// exactly.
//
// Writes open an explicit transaction on first use; `commit` ends it. Schema
// changes (table provisioning, index columns) commit straight away.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Params};
use tracing::{debug, info};

use crate::backend::{case_conflict, IndexKind, Record, StorageBackend};
use crate::error::{DataError, DataResult};

const BACKEND_NAME: &str = "sqlite";

/// Columns every relation carries; index columns may not reuse them.
const RECORD_COLUMNS: [&str; 2] = ["key", "value"];

/// Map a rusqlite error, promoting corruption reports.
fn sql_error(target: &Path, operation: &str, err: rusqlite::Error) -> DataError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => DataError::Corruption {
            target: target.display().to_string(),
            reason: err.to_string(),
        },
        _ => DataError::backend(BACKEND_NAME, operation, err),
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Run `PRAGMA integrity_check` and turn anything but `ok` into corruption.
fn integrity_check(conn: &Connection, path: &Path) -> DataResult<()> {
    let mut stmt = conn
        .prepare("PRAGMA integrity_check")
        .map_err(|e| sql_error(path, "integrity check", e))?;
    let findings = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| sql_error(path, "integrity check", e))?;

    if findings.len() == 1 && findings[0] == "ok" {
        Ok(())
    } else {
        Err(DataError::Corruption {
            target: path.display().to_string(),
            reason: findings.join("; "),
        })
    }
}

/// A relational storage engine powered by SQLite.
///
/// # Example
///
/// ```rust,no_run
/// use tabula_storage::backend::{IndexKind, StorageBackend};
/// use tabula_storage::sqlite_backend::SqliteBackend;
///
/// let mut store = SqliteBackend::open("/tmp/tabula-relational", "data.sqlite3", true).unwrap();
/// store.open_table("games").unwrap();
/// store.add_index("games", "date", IndexKind::Column).unwrap();
/// store.put_indexed("games", "game1", "germany", &[("date", "2020-10-26")]).unwrap();
/// store.commit().unwrap();
/// ```
pub struct SqliteBackend {
    path: PathBuf,
    conn: Connection,
    /// Open tables and the index columns registered on each.
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl SqliteBackend {
    /// Open (or create) `<root>/<file>`.
    ///
    /// `thread_safe` selects SQLite's serialized threading mode; otherwise the
    /// connection is opened without mutexes.
    pub fn open(root: impl AsRef<Path>, file: &str, thread_safe: bool) -> DataResult<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            DataError::Connection(format!("create storage root {}: {e}", root.display()))
        })?;
        let path = root.join(file);

        let threading = if thread_safe {
            OpenFlags::SQLITE_OPEN_FULL_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | threading;
        let conn = Connection::open_with_flags(&path, flags).map_err(|e| {
            DataError::Connection(format!("failed to open sqlite at {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), thread_safe, "opened sqlite database");
        Ok(Self {
            path,
            conn,
            tables: BTreeMap::new(),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run SQLite's integrity check on a database file that is not open elsewhere.
    pub fn verify_file(path: impl AsRef<Path>) -> DataResult<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DataError::Connection(format!(
                "no database file at {}",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| DataError::Corruption {
            target: path.display().to_string(),
            reason: e.to_string(),
        })?;
        integrity_check(&conn, path)?;
        conn.close()
            .map_err(|(_, e)| DataError::backend(BACKEND_NAME, "close", e))
    }

    fn columns(&self, table: &str) -> DataResult<&BTreeSet<String>> {
        self.tables
            .get(table)
            .ok_or_else(|| DataError::backend(BACKEND_NAME, "look up table", format!("'{table}' is not open")))
    }

    fn known_column(&self, table: &str, index: &str) -> DataResult<()> {
        if self.columns(table)?.contains(index) {
            Ok(())
        } else {
            Err(DataError::UnknownIndex {
                table: table.to_string(),
                index: index.to_string(),
            })
        }
    }

    /// Start the write transaction if none is running.
    fn begin(&self) -> DataResult<()> {
        if self.conn.is_autocommit() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| sql_error(&self.path, "begin transaction", e))?;
        }
        Ok(())
    }

    fn fetch<P: Params>(&self, sql: &str, params: P) -> DataResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| sql_error(&self.path, "prepare select", e))?;
        let rows = stmt
            .query_map(params, |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| sql_error(&self.path, "select", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| sql_error(&self.path, "read row", e))
    }

    /// Stored name of the relation SQLite would resolve `table` to, if any.
    fn existing_table(&self, table: &str) -> DataResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                params![table],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| sql_error(&self.path, "inspect schema", e))
    }

    fn has_column(&self, table: &str, column: &str) -> DataResult<bool> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))
            .map_err(|e| sql_error(&self.path, "inspect columns", e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| sql_error(&self.path, "inspect columns", e))?;
        Ok(names.iter().any(|name| name.eq_ignore_ascii_case(column)))
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("tables", &self.tables)
            .finish()
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn open_table(&mut self, table: &str) -> DataResult<()> {
        if self.tables.contains_key(table) {
            return Ok(());
        }
        match self.existing_table(table)? {
            Some(existing) if existing != table => return Err(case_conflict(table, &existing)),
            Some(_) => {}
            None => {
                self.conn
                    .execute_batch(&format!(
                        "CREATE TABLE \"{table}\" (key TEXT PRIMARY KEY, value TEXT)"
                    ))
                    .map_err(|e| sql_error(&self.path, "create table", e))?;
                self.commit()?;
                debug!(table, "provisioned sqlite table");
            }
        }
        self.tables.insert(table.to_string(), BTreeSet::new());
        Ok(())
    }

    fn put(&mut self, table: &str, key: &str, value: &str) -> DataResult<()> {
        self.columns(table)?;
        self.begin()?;

        let exists = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM \"{table}\" WHERE key = ?1"),
                params![key],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| sql_error(&self.path, "lookup", e))?
            .is_some();

        let sql = if exists {
            format!("UPDATE \"{table}\" SET value = ?2 WHERE key = ?1")
        } else {
            format!("INSERT INTO \"{table}\" (key, value) VALUES (?1, ?2)")
        };
        self.conn
            .execute(&sql, params![key, value])
            .map_err(|e| sql_error(&self.path, if exists { "update" } else { "insert" }, e))?;
        Ok(())
    }

    fn put_indexed(
        &mut self,
        table: &str,
        key: &str,
        value: &str,
        columns: &[(&str, &str)],
    ) -> DataResult<()> {
        for (column, _) in columns {
            self.known_column(table, column)?;
        }
        self.put(table, key, value)?;
        for (column, secondary) in columns {
            self.conn
                .execute(
                    &format!("UPDATE \"{table}\" SET \"{column}\" = ?1 WHERE key = ?2"),
                    params![secondary, key],
                )
                .map_err(|e| sql_error(&self.path, "update index column", e))?;
        }
        Ok(())
    }

    fn get(&self, table: &str, key: &str) -> DataResult<Option<String>> {
        self.columns(table)?;
        self.conn
            .query_row(
                &format!("SELECT value FROM \"{table}\" WHERE key = ?1"),
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| sql_error(&self.path, "get", e))
    }

    fn delete(&mut self, table: &str, key: &str) -> DataResult<bool> {
        self.columns(table)?;
        self.begin()?;
        let removed = self
            .conn
            .execute(&format!("DELETE FROM \"{table}\" WHERE key = ?1"), params![key])
            .map_err(|e| sql_error(&self.path, "delete", e))?;
        Ok(removed > 0)
    }

    fn count(&self, table: &str) -> DataResult<u64> {
        self.columns(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
            .map_err(|e| sql_error(&self.path, "count", e))?;
        Ok(count.max(0) as u64)
    }

    fn verify(&mut self, table: &str) -> DataResult<()> {
        self.columns(table)?;
        integrity_check(&self.conn, &self.path)?;
        debug!(table, "sqlite integrity check passed");
        Ok(())
    }

    fn scan(&self, table: &str, after: Option<&str>, limit: usize) -> DataResult<Vec<Record>> {
        self.columns(table)?;
        match after {
            Some(after) => self.fetch(
                &format!("SELECT key, value FROM \"{table}\" WHERE key > ?1 ORDER BY key LIMIT ?2"),
                params![after, sql_limit(limit)],
            ),
            None => self.fetch(
                &format!("SELECT key, value FROM \"{table}\" ORDER BY key LIMIT ?1"),
                params![sql_limit(limit)],
            ),
        }
    }

    fn add_index(&mut self, table: &str, index: &str, kind: IndexKind) -> DataResult<()> {
        if let IndexKind::Derived(_) = kind {
            return Err(DataError::unsupported(BACKEND_NAME, "derived indexes"));
        }
        self.columns(table)?;
        if RECORD_COLUMNS.iter().any(|column| column.eq_ignore_ascii_case(index)) {
            return Err(DataError::DuplicateIndex {
                table: table.to_string(),
                index: index.to_string(),
            });
        }

        if !self.has_column(table, index)? {
            self.conn
                .execute_batch(&format!("ALTER TABLE \"{table}\" ADD COLUMN \"{index}\" TEXT"))
                .map_err(|e| sql_error(&self.path, "add index column", e))?;
        }
        self.conn
            .execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS \"{table}:{index}\" ON \"{table}\" (\"{index}\")"
            ))
            .map_err(|e| sql_error(&self.path, "create index", e))?;
        self.commit()?;

        if let Some(columns) = self.tables.get_mut(table) {
            columns.insert(index.to_string());
        }
        debug!(table, index, "registered index column");
        Ok(())
    }

    fn seek_index(
        &self,
        table: &str,
        index: &str,
        selector: &str,
        after: Option<&str>,
        limit: usize,
    ) -> DataResult<Vec<Record>> {
        self.known_column(table, index)?;
        match after {
            Some(after) => self.fetch(
                &format!(
                    "SELECT key, value FROM \"{table}\" WHERE \"{index}\" = ?1 AND key > ?2 \
                     ORDER BY key LIMIT ?3"
                ),
                params![selector, after, sql_limit(limit)],
            ),
            None => self.fetch(
                &format!(
                    "SELECT key, value FROM \"{table}\" WHERE \"{index}\" = ?1 ORDER BY key LIMIT ?2"
                ),
                params![selector, sql_limit(limit)],
            ),
        }
    }

    fn count_index(&self, table: &str, index: &str, selector: Option<&str>) -> DataResult<u64> {
        self.known_column(table, index)?;
        let count: i64 = match selector {
            None => self.conn.query_row(
                &format!("SELECT COUNT(\"{index}\") FROM \"{table}\""),
                [],
                |row| row.get(0),
            ),
            Some(selector) => self.conn.query_row(
                &format!("SELECT COUNT(*) FROM \"{table}\" WHERE \"{index}\" = ?1"),
                params![selector],
                |row| row.get(0),
            ),
        }
        .map_err(|e| sql_error(&self.path, "count index", e))?;
        Ok(count.max(0) as u64)
    }

    fn commit(&mut self) -> DataResult<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| sql_error(&self.path, "commit", e))?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> DataResult<()> {
        let SqliteBackend { path, conn, .. } = *self;
        conn.close()
            .map_err(|(_, e)| DataError::backend(BACKEND_NAME, "close", e))?;
        info!(path = %path.display(), "closed sqlite database");
        Ok(())
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// redb-backed ordered storage engine for Tabula.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database). No C/C++
// dependencies, builds on any platform with a Rust toolchain.
//
// # Storage Design
//
// Every logical table lives in its own file, `<root>/<table>.redb`, holding:
//
// 1. **`records`**: primary store. Key: primary key bytes. Value: value bytes.
//
// 2. **`index:<name>`**: one per secondary index.
//    Key: `"{secondary}\0{primary}"` (composite for prefix scanning)
//    Value: empty (presence in the index is sufficient)
//
// Duplicate secondary keys therefore sort by primary key, and an exact
// selector match is a prefix scan over `"{selector}\0"`. Every put/delete is
// one write transaction that updates the primary record and every derived
// index together, so the indexes never drift from the records.
//
// Derivation functions live in memory only. Registering an index rebuilds
// its table from the current records, which keeps a reopened store
// consistent with whatever derivation the caller registers this time.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use tracing::{debug, info};

use crate::backend::{case_conflict, IndexKind, KeyDeriver, Record, StorageBackend};
use crate::error::{DataError, DataResult};

const BACKEND_NAME: &str = "redb";

/// File extension used for table files.
pub const TABLE_FILE_EXTENSION: &str = "redb";

/// Primary store inside every table file.
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

/// Separator byte for composite index keys.
const SEP: u8 = 0x00;

/// Index entries carry no value.
const EMPTY: &[u8] = b"";

type RawTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

fn index_table_name(index: &str) -> String {
    format!("index:{index}")
}

/// Build a composite index key: `"{secondary}\0{primary}"`.
fn composite_key(secondary: &str, primary: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(secondary.len() + 1 + primary.len());
    key.extend_from_slice(secondary.as_bytes());
    key.push(SEP);
    key.extend_from_slice(primary.as_bytes());
    key
}

/// Build the scan prefix for one selector: `"{selector}\0"`.
fn selector_prefix(selector: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(selector.len() + 1);
    prefix.extend_from_slice(selector.as_bytes());
    prefix.push(SEP);
    prefix
}

/// Smallest key that sorts strictly after `key`.
fn successor(mut key: Vec<u8>) -> Vec<u8> {
    key.push(0x00);
    key
}

fn decode(operation: &str, bytes: &[u8]) -> DataResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DataError::backend(BACKEND_NAME, operation, format!("stored bytes are not UTF-8: {e}")))
}

/// Map a redb storage error, promoting corruption reports.
fn storage_error(target: &str, operation: &str, err: redb::StorageError) -> DataError {
    match err {
        redb::StorageError::Corrupted(reason) => DataError::Corruption {
            target: target.to_string(),
            reason,
        },
        other => DataError::backend(BACKEND_NAME, operation, other),
    }
}

/// Derive a secondary key, rejecting ones that would break composite keys.
fn derive_secondary(derive: &KeyDeriver, index: &str, key: &str, value: &str) -> DataResult<Option<String>> {
    match derive(key, value) {
        Some(secondary) if secondary.as_bytes().contains(&SEP) => Err(DataError::backend(
            BACKEND_NAME,
            format!("index '{index}'"),
            "derived secondary key contains a NUL byte",
        )),
        other => Ok(other),
    }
}

/// One open table file.
struct RedbTable {
    path: PathBuf,
    db: Database,
    indexes: BTreeMap<String, KeyDeriver>,
}

impl RedbTable {
    fn begin_write(&self) -> DataResult<WriteTransaction> {
        self.db
            .begin_write()
            .map_err(|e| DataError::backend(BACKEND_NAME, "begin write transaction", e))
    }

    /// Write (`Some`) or remove (`None`) one record and keep every index in step.
    ///
    /// Returns whether the key existed before.
    fn write_record(&self, name: &str, key: &str, value: Option<&str>) -> DataResult<bool> {
        let txn = self.begin_write()?;
        let previous = {
            let mut records = txn
                .open_table(RECORDS)
                .map_err(|e| DataError::backend(BACKEND_NAME, "open records", e))?;
            let previous = match value {
                Some(value) => records.insert(key.as_bytes(), value.as_bytes()),
                None => records.remove(key.as_bytes()),
            }
            .map_err(|e| storage_error(name, "write record", e))?
            .map(|guard| guard.value().to_vec());
            match previous {
                Some(bytes) => Some(decode("read previous value", &bytes)?),
                None => None,
            }
        };

        for (index, derive) in &self.indexes {
            let table_name = index_table_name(index);
            let mut entries = txn
                .open_table(RawTable::new(&table_name))
                .map_err(|e| DataError::backend(BACKEND_NAME, "open index", e))?;
            if let Some(old) = previous.as_deref() {
                if let Some(secondary) = derive_secondary(derive, index, key, old)? {
                    entries
                        .remove(composite_key(&secondary, key).as_slice())
                        .map_err(|e| storage_error(name, "unindex record", e))?;
                }
            }
            if let Some(new) = value {
                if let Some(secondary) = derive_secondary(derive, index, key, new)? {
                    entries
                        .insert(composite_key(&secondary, key).as_slice(), EMPTY)
                        .map_err(|e| storage_error(name, "index record", e))?;
                }
            }
        }

        txn.commit()
            .map_err(|e| DataError::backend(BACKEND_NAME, "commit", e))?;
        Ok(previous.is_some())
    }

    /// Drop and repopulate one index table from the current records.
    fn rebuild_index(&self, name: &str, index: &str, derive: &KeyDeriver) -> DataResult<u64> {
        let table_name = index_table_name(index);
        let definition = RawTable::new(&table_name);
        let txn = self.begin_write()?;
        txn.delete_table(definition)
            .map_err(|e| DataError::backend(BACKEND_NAME, "clear index", e))?;

        let mut indexed = 0u64;
        {
            let records = txn
                .open_table(RECORDS)
                .map_err(|e| DataError::backend(BACKEND_NAME, "open records", e))?;
            let mut entries = txn
                .open_table(definition)
                .map_err(|e| DataError::backend(BACKEND_NAME, "open index", e))?;
            let iter = records
                .iter()
                .map_err(|e| storage_error(name, "scan records", e))?;
            for entry in iter {
                let (k, v) = entry.map_err(|e| storage_error(name, "scan entry", e))?;
                let key = decode("decode key", k.value())?;
                let value = decode("decode value", v.value())?;
                if let Some(secondary) = derive_secondary(derive, index, &key, &value)? {
                    entries
                        .insert(composite_key(&secondary, &key).as_slice(), EMPTY)
                        .map_err(|e| storage_error(name, "index record", e))?;
                    indexed += 1;
                }
            }
        }

        txn.commit()
            .map_err(|e| DataError::backend(BACKEND_NAME, "commit", e))?;
        Ok(indexed)
    }
}

/// An ordered storage engine powered by redb, one database file per table.
///
/// # Example
///
/// ```rust,no_run
/// use tabula_storage::backend::StorageBackend;
/// use tabula_storage::redb_backend::RedbBackend;
///
/// let mut store = RedbBackend::open("/tmp/tabula-ordered").unwrap();
/// store.open_table("games").unwrap();
/// store.put("games", "game1", "germany").unwrap();
/// assert_eq!(store.get("games", "game1").unwrap(), Some("germany".to_string()));
/// ```
pub struct RedbBackend {
    root: PathBuf,
    tables: HashMap<String, RedbTable>,
}

impl RedbBackend {
    /// Use `root` as the storage directory, creating it if needed.
    pub fn open(root: impl AsRef<Path>) -> DataResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| {
            DataError::Connection(format!("create storage root {}: {e}", root.display()))
        })?;
        info!(root = %root.display(), "opened redb environment");
        Ok(Self {
            root,
            tables: HashMap::new(),
        })
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `table`.
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.{TABLE_FILE_EXTENSION}"))
    }

    /// Run redb's integrity check on a table file that is not open elsewhere.
    pub fn verify_file(path: impl AsRef<Path>) -> DataResult<()> {
        let path = path.as_ref();
        let target = path.display().to_string();
        if !path.is_file() {
            return Err(DataError::Connection(format!("no database file at {target}")));
        }
        let mut db = Database::open(path).map_err(|e| open_error(&target, e))?;
        check_integrity(&mut db, &target)
    }

    /// Table file in the root whose name matches `table` except for letter case.
    fn case_variant(&self, table: &str) -> DataResult<Option<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            DataError::Connection(format!("list storage root {}: {e}", self.root.display()))
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                DataError::Connection(format!("list storage root {}: {e}", self.root.display()))
            })?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(stem) = file_name.strip_suffix(&format!(".{TABLE_FILE_EXTENSION}")) else {
                continue;
            };
            if stem != table && stem.eq_ignore_ascii_case(table) {
                return Ok(Some(stem.to_string()));
            }
        }
        Ok(None)
    }

    fn table(&self, name: &str) -> DataResult<&RedbTable> {
        self.tables
            .get(name)
            .ok_or_else(|| DataError::backend(BACKEND_NAME, "look up table", format!("'{name}' is not open")))
    }

    fn table_mut(&mut self, name: &str) -> DataResult<&mut RedbTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DataError::backend(BACKEND_NAME, "look up table", format!("'{name}' is not open")))
    }

    fn known_index(table: &RedbTable, name: &str, index: &str) -> DataResult<()> {
        if table.indexes.contains_key(index) {
            Ok(())
        } else {
            Err(DataError::UnknownIndex {
                table: name.to_string(),
                index: index.to_string(),
            })
        }
    }
}

/// Map a failure to open a file for verification.
///
/// Only damage and unreadable formats are corruption. A file that is locked
/// by another handle or cannot be read is a connection problem.
fn open_error(target: &str, err: redb::DatabaseError) -> DataError {
    let corrupt = match &err {
        redb::DatabaseError::Storage(redb::StorageError::Corrupted(_))
        | redb::DatabaseError::UpgradeRequired(_)
        | redb::DatabaseError::RepairAborted => true,
        redb::DatabaseError::Storage(redb::StorageError::Io(io)) => matches!(
            io.kind(),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    };
    if corrupt {
        DataError::Corruption {
            target: target.to_string(),
            reason: err.to_string(),
        }
    } else {
        DataError::Connection(format!("cannot open {target}: {err}"))
    }
}

fn check_integrity(db: &mut Database, target: &str) -> DataResult<()> {
    match db.check_integrity() {
        Ok(true) => Ok(()),
        Ok(false) => Err(DataError::Corruption {
            target: target.to_string(),
            reason: "integrity check found damage (repaired in place)".to_string(),
        }),
        Err(e) => Err(DataError::Corruption {
            target: target.to_string(),
            reason: e.to_string(),
        }),
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("root", &self.root)
            .field("tables", &self.tables.len())
            .finish()
    }
}

impl StorageBackend for RedbBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn open_table(&mut self, table: &str) -> DataResult<()> {
        if self.tables.contains_key(table) {
            return Ok(());
        }
        if let Some(existing) = self.case_variant(table)? {
            return Err(case_conflict(table, &existing));
        }
        let path = self.table_path(table);
        let db = Database::create(&path).map_err(|e| {
            DataError::Connection(format!("failed to open redb at {}: {e}", path.display()))
        })?;

        // Create the primary table up front so readers never see it missing.
        let txn = db
            .begin_write()
            .map_err(|e| DataError::backend(BACKEND_NAME, "begin write transaction", e))?;
        txn.open_table(RECORDS)
            .map_err(|e| DataError::backend(BACKEND_NAME, "provision records", e))?;
        txn.commit()
            .map_err(|e| DataError::backend(BACKEND_NAME, "commit", e))?;

        debug!(table, path = %path.display(), "opened redb table");
        self.tables.insert(
            table.to_string(),
            RedbTable {
                path,
                db,
                indexes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn put(&mut self, table: &str, key: &str, value: &str) -> DataResult<()> {
        self.table(table)?.write_record(table, key, Some(value)).map(|_| ())
    }

    fn get(&self, table: &str, key: &str) -> DataResult<Option<String>> {
        let txn = self
            .table(table)?
            .db
            .begin_read()
            .map_err(|e| DataError::backend(BACKEND_NAME, "begin read transaction", e))?;
        let records = txn
            .open_table(RECORDS)
            .map_err(|e| DataError::backend(BACKEND_NAME, "open records", e))?;
        match records.get(key.as_bytes()) {
            Ok(Some(value)) => Ok(Some(decode("decode value", value.value())?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_error(table, "get", e)),
        }
    }

    fn delete(&mut self, table: &str, key: &str) -> DataResult<bool> {
        self.table(table)?.write_record(table, key, None)
    }

    fn count(&self, table: &str) -> DataResult<u64> {
        let txn = self
            .table(table)?
            .db
            .begin_read()
            .map_err(|e| DataError::backend(BACKEND_NAME, "begin read transaction", e))?;
        let records = txn
            .open_table(RECORDS)
            .map_err(|e| DataError::backend(BACKEND_NAME, "open records", e))?;
        records.len().map_err(|e| storage_error(table, "count", e))
    }

    fn verify(&mut self, table: &str) -> DataResult<()> {
        let handle = self.table_mut(table)?;
        let target = handle.path.display().to_string();
        check_integrity(&mut handle.db, &target)?;
        debug!(table, "redb integrity check passed");
        Ok(())
    }

    fn scan(&self, table: &str, after: Option<&str>, limit: usize) -> DataResult<Vec<Record>> {
        let txn = self
            .table(table)?
            .db
            .begin_read()
            .map_err(|e| DataError::backend(BACKEND_NAME, "begin read transaction", e))?;
        let records = txn
            .open_table(RECORDS)
            .map_err(|e| DataError::backend(BACKEND_NAME, "open records", e))?;

        let start = after.map(|key| successor(key.as_bytes().to_vec())).unwrap_or_default();
        let iter = records
            .range(start.as_slice()..)
            .map_err(|e| storage_error(table, "range scan", e))?;

        let mut batch = Vec::with_capacity(limit.min(1024));
        for entry in iter.take(limit) {
            let (k, v) = entry.map_err(|e| storage_error(table, "scan entry", e))?;
            batch.push((decode("decode key", k.value())?, decode("decode value", v.value())?));
        }
        Ok(batch)
    }

    fn add_index(&mut self, table: &str, index: &str, kind: IndexKind) -> DataResult<()> {
        let derive = match kind {
            IndexKind::Derived(derive) => derive,
            IndexKind::Column => return Err(DataError::unsupported(BACKEND_NAME, "column indexes")),
        };
        let handle = self.table_mut(table)?;
        let indexed = handle.rebuild_index(table, index, &derive)?;
        handle.indexes.insert(index.to_string(), derive);
        debug!(table, index, indexed, "registered derived index");
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
        let handle = self.table(table)?;
        Self::known_index(handle, table, index)?;

        let txn = handle
            .db
            .begin_read()
            .map_err(|e| DataError::backend(BACKEND_NAME, "begin read transaction", e))?;
        let table_name = index_table_name(index);
        let entries = txn
            .open_table(RawTable::new(&table_name))
            .map_err(|e| DataError::backend(BACKEND_NAME, "open index", e))?;
        let records = txn
            .open_table(RECORDS)
            .map_err(|e| DataError::backend(BACKEND_NAME, "open records", e))?;

        let prefix = selector_prefix(selector);
        let start = match after {
            Some(key) => successor(composite_key(selector, key)),
            None => prefix.clone(),
        };
        let iter = entries
            .range(start.as_slice()..)
            .map_err(|e| storage_error(table, "index scan", e))?;

        let mut batch = Vec::new();
        for entry in iter {
            if batch.len() >= limit {
                break;
            }
            let entry = entry.map_err(|e| storage_error(table, "index entry", e))?;
            let composite = entry.0.value();

            // Stop when keys no longer carry this selector.
            if !composite.starts_with(&prefix) {
                break;
            }
            let primary = &composite[prefix.len()..];
            let value = records
                .get(primary)
                .map_err(|e| storage_error(table, "record lookup", e))?;
            if let Some(value) = value {
                batch.push((decode("decode key", primary)?, decode("decode value", value.value())?));
            }
        }
        Ok(batch)
    }

    fn count_index(&self, table: &str, index: &str, selector: Option<&str>) -> DataResult<u64> {
        let handle = self.table(table)?;
        Self::known_index(handle, table, index)?;

        let txn = handle
            .db
            .begin_read()
            .map_err(|e| DataError::backend(BACKEND_NAME, "begin read transaction", e))?;
        let table_name = index_table_name(index);
        let entries = txn
            .open_table(RawTable::new(&table_name))
            .map_err(|e| DataError::backend(BACKEND_NAME, "open index", e))?;

        let Some(selector) = selector else {
            return entries.len().map_err(|e| storage_error(table, "count index", e));
        };

        let prefix = selector_prefix(selector);
        let iter = entries
            .range(prefix.as_slice()..)
            .map_err(|e| storage_error(table, "index scan", e))?;
        let mut count = 0u64;
        for entry in iter {
            let entry = entry.map_err(|e| storage_error(table, "index entry", e))?;
            if !entry.0.value().starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    fn commit(&mut self) -> DataResult<()> {
        // Every write transaction is committed (and fsynced) as it happens.
        Ok(())
    }

    fn close(self: Box<Self>) -> DataResult<()> {
        let RedbBackend { root, tables } = *self;
        let count = tables.len();
        drop(tables);
        info!(root = %root.display(), tables = count, "closed redb environment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_backend() -> (RedbBackend, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut backend = RedbBackend::open(dir.path()).unwrap();
        backend.open_table("games").unwrap();
        (backend, dir)
    }

    fn by_date() -> IndexKind {
        IndexKind::derived(|key, _| {
            Some(if key == "game1" { "2020-10-26" } else { "2020-11-26" }.to_string())
        })
    }

    #[test]
    fn test_basic_crud() {
        let (mut backend, _dir) = temp_backend();

        assert_eq!(backend.get("games", "game1").unwrap(), None);

        backend.put("games", "game1", "germany").unwrap();
        assert_eq!(backend.get("games", "game1").unwrap(), Some("germany".to_string()));

        backend.put("games", "game1", "usa").unwrap();
        assert_eq!(backend.get("games", "game1").unwrap(), Some("usa".to_string()));
        assert_eq!(backend.count("games").unwrap(), 1);

        assert!(backend.delete("games", "game1").unwrap());
        assert_eq!(backend.get("games", "game1").unwrap(), None);
        assert!(!backend.delete("games", "game1").unwrap());
    }

    #[test]
    fn test_table_file_per_table() {
        let (mut backend, dir) = temp_backend();
        backend.open_table("comps").unwrap();
        assert!(dir.path().join("games.redb").is_file());
        assert!(dir.path().join("comps.redb").is_file());
    }

    #[test]
    fn test_scan_in_batches() {
        let (mut backend, _dir) = temp_backend();
        for i in 0..5 {
            backend.put("games", &format!("game{i}"), &format!("v{i}")).unwrap();
        }

        let first = backend.scan("games", None, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].0, "game0");
        assert_eq!(first[1].0, "game1");

        let rest = backend.scan("games", Some("game1"), 10).unwrap();
        let keys: Vec<&str> = rest.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["game2", "game3", "game4"]);
    }

    #[test]
    fn test_derived_index_lookup() {
        let (mut backend, _dir) = temp_backend();
        backend.add_index("games", "date", by_date()).unwrap();
        backend.put("games", "game1", "germany").unwrap();
        backend.put("games", "game2", "usa").unwrap();
        backend.put("games", "game3", "italy").unwrap();

        let hits = backend.seek_index("games", "date", "2020-10-26", None, 10).unwrap();
        assert_eq!(hits, vec![("game1".to_string(), "germany".to_string())]);

        let later = backend.seek_index("games", "date", "2020-11-26", None, 1).unwrap();
        assert_eq!(later, vec![("game2".to_string(), "usa".to_string())]);
        let later = backend
            .seek_index("games", "date", "2020-11-26", Some("game2"), 10)
            .unwrap();
        assert_eq!(later, vec![("game3".to_string(), "italy".to_string())]);

        assert_eq!(backend.count_index("games", "date", None).unwrap(), 3);
        assert_eq!(backend.count_index("games", "date", Some("2020-11-26")).unwrap(), 2);
    }

    #[test]
    fn test_selector_is_exact_not_prefix() {
        let (mut backend, _dir) = temp_backend();
        backend
            .add_index("games", "country", IndexKind::derived(|_, value| Some(value.to_string())))
            .unwrap();
        backend.put("games", "a", "us").unwrap();
        backend.put("games", "b", "usa").unwrap();

        let hits = backend.seek_index("games", "country", "us", None, 10).unwrap();
        assert_eq!(hits, vec![("a".to_string(), "us".to_string())]);
    }

    #[test]
    fn test_index_follows_overwrite_and_delete() {
        let (mut backend, _dir) = temp_backend();
        backend
            .add_index("games", "country", IndexKind::derived(|_, value| Some(value.to_string())))
            .unwrap();
        backend.put("games", "game1", "germany").unwrap();
        backend.put("games", "game1", "usa").unwrap();
        assert_eq!(backend.count_index("games", "country", Some("germany")).unwrap(), 0);
        assert_eq!(backend.count_index("games", "country", Some("usa")).unwrap(), 1);

        backend.delete("games", "game1").unwrap();
        assert_eq!(backend.count_index("games", "country", None).unwrap(), 0);
    }

    #[test]
    fn test_add_index_rebuilds_from_existing_records() {
        let (mut backend, _dir) = temp_backend();
        backend.put("games", "game1", "germany").unwrap();
        backend.put("games", "game2", "usa").unwrap();
        backend.add_index("games", "date", by_date()).unwrap();
        assert_eq!(backend.count_index("games", "date", Some("2020-10-26")).unwrap(), 1);

        // Re-registering with another derivation replaces the entries.
        backend
            .add_index("games", "date", IndexKind::derived(|_, _| Some("2021-01-01".to_string())))
            .unwrap();
        assert_eq!(backend.count_index("games", "date", Some("2020-10-26")).unwrap(), 0);
        assert_eq!(backend.count_index("games", "date", Some("2021-01-01")).unwrap(), 2);
    }

    #[test]
    fn test_nul_in_secondary_key_rejected() {
        let (mut backend, _dir) = temp_backend();
        backend
            .add_index("games", "bad", IndexKind::derived(|_, _| Some("a\0b".to_string())))
            .unwrap();
        let result = backend.put("games", "game1", "germany");
        assert!(matches!(result, Err(DataError::Backend { .. })));
        // The failed transaction left nothing behind.
        assert_eq!(backend.get("games", "game1").unwrap(), None);
    }

    #[test]
    fn test_unknown_index() {
        let (backend, _dir) = temp_backend();
        let result = backend.seek_index("games", "nope", "x", None, 10);
        assert!(matches!(result, Err(DataError::UnknownIndex { .. })));
    }

    #[test]
    fn test_column_index_unsupported() {
        let (mut backend, _dir) = temp_backend();
        let result = backend.add_index("games", "date", IndexKind::Column);
        assert!(matches!(result, Err(DataError::Unsupported { .. })));
    }

    #[test]
    fn test_verify_open_table() {
        let (mut backend, _dir) = temp_backend();
        backend.put("games", "game1", "germany").unwrap();
        backend.verify("games").unwrap();
    }

    #[test]
    fn test_verify_file_after_close() {
        let (mut backend, dir) = temp_backend();
        backend.put("games", "game1", "germany").unwrap();
        Box::new(backend).close().unwrap();

        RedbBackend::verify_file(dir.path().join("games.redb")).unwrap();
    }

    #[test]
    fn test_verify_file_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.redb");
        std::fs::write(&path, vec![0xAB; 4096]).unwrap();
        let result = RedbBackend::verify_file(&path);
        assert!(matches!(result, Err(DataError::Corruption { .. })), "{result:?}");
    }

    #[test]
    fn test_verify_file_in_use_is_connection_error() {
        let (mut backend, dir) = temp_backend();
        backend.put("games", "game1", "germany").unwrap();

        // The live handle holds the file lock; the file itself is healthy.
        let result = RedbBackend::verify_file(dir.path().join("games.redb"));
        assert!(matches!(result, Err(DataError::Connection(_))), "{result:?}");

        Box::new(backend).close().unwrap();
        RedbBackend::verify_file(dir.path().join("games.redb")).unwrap();
    }

    #[test]
    fn test_open_table_rejects_case_variant() {
        let dir = tempdir().unwrap();
        {
            let mut backend = RedbBackend::open(dir.path()).unwrap();
            backend.open_table("games").unwrap();
            assert!(matches!(backend.open_table("Games"), Err(DataError::InvalidName(_))));
            Box::new(backend).close().unwrap();
        }

        let mut backend = RedbBackend::open(dir.path()).unwrap();
        assert!(matches!(backend.open_table("GAMES"), Err(DataError::InvalidName(_))));
        backend.open_table("games").unwrap();
    }

    #[test]
    fn test_verify_file_missing_is_connection_error() {
        let dir = tempdir().unwrap();
        let result = RedbBackend::verify_file(dir.path().join("missing.redb"));
        assert!(matches!(result, Err(DataError::Connection(_))));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut backend = RedbBackend::open(dir.path()).unwrap();
            backend.open_table("games").unwrap();
            backend.put("games", "persistent-key", "persistent-value").unwrap();
            Box::new(backend).close().unwrap();
        }
        {
            let mut backend = RedbBackend::open(dir.path()).unwrap();
            backend.open_table("games").unwrap();
            assert_eq!(
                backend.get("games", "persistent-key").unwrap(),
                Some("persistent-value".to_string())
            );
        }
    }

    #[test]
    fn test_successor_and_prefix() {
        assert_eq!(successor(b"ab".to_vec()), b"ab\0".to_vec());
        assert_eq!(selector_prefix("2020"), b"2020\0".to_vec());
        assert_eq!(composite_key("s", "p"), b"s\0p".to_vec());
    }

    #[test]
    fn test_name() {
        let (backend, _dir) = temp_backend();
        assert_eq!(backend.name(), "redb");
    }
}

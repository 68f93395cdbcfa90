// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory storage backend for Tabula.
//
// Each table is a `BTreeMap` keyed by primary key, so iteration order matches
// the on-disk ordered engine byte for byte. Derived indexes are ordered sets
// of `(secondary, primary)` pairs maintained on every write. Intended for
// testing, development, and small ephemeral datasets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use crate::backend::{case_conflict, IndexKind, KeyDeriver, Record, StorageBackend};
use crate::error::{DataError, DataResult};

const BACKEND_NAME: &str = "memory";

struct MemoryIndex {
    derive: KeyDeriver,
    entries: BTreeSet<(String, String)>,
}

#[derive(Default)]
struct MemoryTable {
    records: BTreeMap<String, String>,
    indexes: BTreeMap<String, MemoryIndex>,
}

impl MemoryTable {
    fn unindex(&mut self, key: &str, value: &str) {
        for index in self.indexes.values_mut() {
            if let Some(secondary) = (index.derive)(key, value) {
                index.entries.remove(&(secondary, key.to_string()));
            }
        }
    }

    fn index(&mut self, key: &str, value: &str) {
        for index in self.indexes.values_mut() {
            if let Some(secondary) = (index.derive)(key, value) {
                index.entries.insert((secondary, key.to_string()));
            }
        }
    }
}

/// An in-memory ordered engine. All data is lost on drop.
///
/// # Example
///
/// ```rust
/// use tabula_storage::backend::StorageBackend;
/// use tabula_storage::memory::InMemoryBackend;
///
/// let mut store = InMemoryBackend::new();
/// store.open_table("games").unwrap();
/// store.put("games", "game1", "germany").unwrap();
/// assert_eq!(store.get("games", "game1").unwrap(), Some("germany".to_string()));
/// ```
#[derive(Default)]
pub struct InMemoryBackend {
    tables: HashMap<String, MemoryTable>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> DataResult<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| DataError::backend(BACKEND_NAME, "look up table", format!("'{name}' is not open")))
    }

    fn table_mut(&mut self, name: &str) -> DataResult<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DataError::backend(BACKEND_NAME, "look up table", format!("'{name}' is not open")))
    }

    fn index<'t>(table: &'t MemoryTable, table_name: &str, index: &str) -> DataResult<&'t MemoryIndex> {
        table.indexes.get(index).ok_or_else(|| DataError::UnknownIndex {
            table: table_name.to_string(),
            index: index.to_string(),
        })
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();
        f.debug_struct("InMemoryBackend").field("tables", &names).finish()
    }
}

impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn open_table(&mut self, table: &str) -> DataResult<()> {
        if !self.tables.contains_key(table) {
            if let Some(existing) = self.tables.keys().find(|known| known.eq_ignore_ascii_case(table)) {
                return Err(case_conflict(table, existing));
            }
            self.tables.insert(table.to_string(), MemoryTable::default());
        }
        Ok(())
    }

    fn put(&mut self, table: &str, key: &str, value: &str) -> DataResult<()> {
        let table = self.table_mut(table)?;
        if let Some(previous) = table.records.insert(key.to_string(), value.to_string()) {
            table.unindex(key, &previous);
        }
        table.index(key, value);
        Ok(())
    }

    fn get(&self, table: &str, key: &str) -> DataResult<Option<String>> {
        Ok(self.table(table)?.records.get(key).cloned())
    }

    fn delete(&mut self, table: &str, key: &str) -> DataResult<bool> {
        let table = self.table_mut(table)?;
        match table.records.remove(key) {
            Some(previous) => {
                table.unindex(key, &previous);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count(&self, table: &str) -> DataResult<u64> {
        Ok(self.table(table)?.records.len() as u64)
    }

    fn verify(&mut self, table: &str) -> DataResult<()> {
        self.table(table).map(|_| ())
    }

    fn scan(&self, table: &str, after: Option<&str>, limit: usize) -> DataResult<Vec<Record>> {
        let records = &self.table(table)?.records;
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        Ok(records
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn add_index(&mut self, table: &str, index: &str, kind: IndexKind) -> DataResult<()> {
        let derive = match kind {
            IndexKind::Derived(derive) => derive,
            IndexKind::Column => return Err(DataError::unsupported(BACKEND_NAME, "column indexes")),
        };
        let table = self.table_mut(table)?;
        let entries = table
            .records
            .iter()
            .filter_map(|(k, v)| derive(k.as_str(), v.as_str()).map(|secondary| (secondary, k.clone())))
            .collect();
        table
            .indexes
            .insert(index.to_string(), MemoryIndex { derive, entries });
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
        let owner = self.table(table)?;
        let index = Self::index(owner, table, index)?;
        let lower = match after {
            Some(key) => Bound::Excluded((selector.to_string(), key.to_string())),
            None => Bound::Included((selector.to_string(), String::new())),
        };

        let mut records = Vec::new();
        for (secondary, primary) in index.entries.range((lower, Bound::Unbounded)) {
            if secondary != selector || records.len() >= limit {
                break;
            }
            if let Some(value) = owner.records.get(primary) {
                records.push((primary.clone(), value.clone()));
            }
        }
        Ok(records)
    }

    fn count_index(&self, table: &str, index: &str, selector: Option<&str>) -> DataResult<u64> {
        let index = Self::index(self.table(table)?, table, index)?;
        let count = match selector {
            None => index.entries.len(),
            Some(selector) => index
                .entries
                .range((selector.to_string(), String::new())..)
                .take_while(|(secondary, _)| secondary == selector)
                .count(),
        };
        Ok(count as u64)
    }

    fn commit(&mut self) -> DataResult<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> DataResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn games() -> InMemoryBackend {
        let mut backend = InMemoryBackend::new();
        backend.open_table("games").unwrap();
        backend
    }

    fn by_date() -> IndexKind {
        IndexKind::derived(|key, _| {
            Some(if key == "game1" { "2020-10-26" } else { "2020-11-26" }.to_string())
        })
    }

    #[test]
    fn test_basic_crud() {
        let mut backend = games();

        assert_eq!(backend.get("games", "game1").unwrap(), None);

        backend.put("games", "game1", "germany").unwrap();
        assert_eq!(backend.get("games", "game1").unwrap(), Some("germany".to_string()));

        backend.put("games", "game1", "usa").unwrap();
        assert_eq!(backend.get("games", "game1").unwrap(), Some("usa".to_string()));
        assert_eq!(backend.count("games").unwrap(), 1);

        assert!(backend.delete("games", "game1").unwrap());
        assert!(!backend.delete("games", "game1").unwrap());
        assert_eq!(backend.count("games").unwrap(), 0);
    }

    #[test]
    fn test_scan_resumes_after_key() {
        let mut backend = games();
        for key in ["c", "a", "b", "d"] {
            backend.put("games", key, key).unwrap();
        }

        let first = backend.scan("games", None, 2).unwrap();
        assert_eq!(first, vec![("a".into(), "a".into()), ("b".into(), "b".into())]);

        let rest = backend.scan("games", Some("b"), 10).unwrap();
        assert_eq!(rest, vec![("c".into(), "c".into()), ("d".into(), "d".into())]);
    }

    #[test]
    fn test_derived_index_tracks_overwrite_and_delete() {
        let mut backend = games();
        backend.add_index("games", "date", by_date()).unwrap();
        backend.put("games", "game1", "germany").unwrap();
        backend.put("games", "game2", "usa").unwrap();
        backend.put("games", "game3", "italy").unwrap();

        let hits = backend.seek_index("games", "date", "2020-10-26", None, 10).unwrap();
        assert_eq!(hits, vec![("game1".to_string(), "germany".to_string())]);
        assert_eq!(backend.count_index("games", "date", Some("2020-11-26")).unwrap(), 2);
        assert_eq!(backend.count_index("games", "date", None).unwrap(), 3);

        backend.delete("games", "game2").unwrap();
        assert_eq!(backend.count_index("games", "date", Some("2020-11-26")).unwrap(), 1);
    }

    #[test]
    fn test_add_index_indexes_existing_records() {
        let mut backend = games();
        backend.put("games", "game1", "germany").unwrap();
        backend.add_index("games", "date", by_date()).unwrap();
        assert_eq!(backend.count_index("games", "date", Some("2020-10-26")).unwrap(), 1);
    }

    #[test]
    fn test_column_index_unsupported() {
        let mut backend = games();
        let result = backend.add_index("games", "date", IndexKind::Column);
        assert!(matches!(result, Err(DataError::Unsupported { .. })));
    }

    #[test]
    fn test_unopened_table_is_backend_error() {
        let backend = InMemoryBackend::new();
        assert!(matches!(backend.get("nope", "k"), Err(DataError::Backend { .. })));
    }

    #[test]
    fn test_open_table_rejects_case_variant() {
        let mut store = InMemoryBackend::new();
        store.open_table("games").unwrap();
        store.open_table("games").unwrap();
        assert!(matches!(store.open_table("GAMES"), Err(DataError::InvalidName(_))));
    }

    #[test]
    fn test_name() {
        assert_eq!(InMemoryBackend::new().name(), "memory");
    }
}

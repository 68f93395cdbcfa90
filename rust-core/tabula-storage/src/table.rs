// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tables and indexes as seen through the facade.
//
// `Table` and `Index` are the registry entries owned by `Data`: a name, the
// registered indexes, and one cursor each. `TableRef` and `IndexRef` are
// short-lived handles that pair a registry entry with the backend so that
// operations and cursor steps can be dispatched. A handle borrows the facade
// mutably, which keeps every cursor exclusively owned by its table or index.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::backend::{validate_name, IndexKind, Record, StorageBackend};
use crate::cursor::{Cursor, CursorState, RecordSource};
use crate::error::{DataError, DataResult};

/// Names an index and the secondary key to look up in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub index: String,
    pub value: String,
}

impl Selector {
    pub fn new(index: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Index {
    name: String,
    kind: &'static str,
    selector: Option<String>,
    cursor: Cursor,
}

#[derive(Debug)]
pub(crate) struct Table {
    name: String,
    cursor: Cursor,
    indexes: BTreeMap<String, Index>,
    batch_size: usize,
}

impl Table {
    pub(crate) fn new(name: &str, batch_size: usize) -> Self {
        Self {
            name: name.to_string(),
            cursor: Cursor::new(batch_size),
            indexes: BTreeMap::new(),
            batch_size,
        }
    }

    pub(crate) fn has_index(&self, index: &str) -> bool {
        self.indexes.contains_key(index)
    }

    /// Whether an index name equal to `index` up to ASCII case exists.
    pub(crate) fn has_index_ignoring_case(&self, index: &str) -> bool {
        self.indexes.keys().any(|known| known.eq_ignore_ascii_case(index))
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Cursors of this table and its indexes that are mid-pass.
    pub(crate) fn open_cursors(&self) -> usize {
        let own = usize::from(self.cursor.is_open());
        own + self
            .indexes
            .values()
            .filter(|index| index.cursor.is_open())
            .count()
    }

    pub(crate) fn close_cursors(&mut self) {
        self.cursor.reset();
        for index in self.indexes.values_mut() {
            index.cursor.reset();
        }
    }

    fn unknown_index(&self, index: &str) -> DataError {
        DataError::UnknownIndex {
            table: self.name.clone(),
            index: index.to_string(),
        }
    }
}

/// A table handle borrowed from [`crate::Data`].
pub struct TableRef<'a> {
    backend: &'a mut (dyn StorageBackend + 'static),
    table: &'a mut Table,
    table_names: &'a BTreeSet<String>,
}

impl<'a> TableRef<'a> {
    pub(crate) fn new(
        backend: &'a mut (dyn StorageBackend + 'static),
        table: &'a mut Table,
        table_names: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            backend,
            table,
            table_names,
        }
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// Registered index names, sorted.
    pub fn indexes(&self) -> impl Iterator<Item = &str> + '_ {
        self.table.indexes.keys().map(String::as_str)
    }

    /// Insert `key` or overwrite its value.
    pub fn put(&mut self, key: &str, value: &str) -> DataResult<()> {
        self.backend.put(&self.table.name, key, value)
    }

    /// Upsert `key` and set manually maintained index columns.
    ///
    /// Every column must have been registered with [`TableRef::add_index`].
    pub fn put_indexed(&mut self, key: &str, value: &str, columns: &[(&str, &str)]) -> DataResult<()> {
        if let Some((column, _)) = columns.iter().find(|(column, _)| !self.table.has_index(column)) {
            return Err(self.table.unknown_index(column));
        }
        self.backend.put_indexed(&self.table.name, key, value, columns)
    }

    /// Value stored under `key`, `None` if there is none.
    pub fn get(&self, key: &str) -> DataResult<Option<String>> {
        self.backend.get(&self.table.name, key)
    }

    /// Remove `key`. Returns whether it was present; absence is not an error.
    pub fn delete(&mut self, key: &str) -> DataResult<bool> {
        self.backend.delete(&self.table.name, key)
    }

    pub fn count(&self) -> DataResult<u64> {
        self.backend.count(&self.table.name)
    }

    pub fn verify(&mut self) -> DataResult<()> {
        self.backend.verify(&self.table.name)
    }

    /// Register a secondary index on this table.
    ///
    /// Fails with [`DataError::DuplicateIndex`] if `index` is already the name
    /// of a table or of an index on this table, ignoring ASCII case.
    pub fn add_index(&mut self, index: &str, kind: IndexKind) -> DataResult<()> {
        validate_name(index)?;
        let taken = self
            .table_names
            .iter()
            .any(|known| known.eq_ignore_ascii_case(index));
        if taken || self.table.has_index_ignoring_case(index) {
            return Err(DataError::DuplicateIndex {
                table: self.table.name.clone(),
                index: index.to_string(),
            });
        }

        let label = kind.label();
        self.backend.add_index(&self.table.name, index, kind)?;
        self.table.indexes.insert(
            index.to_string(),
            Index {
                name: index.to_string(),
                kind: label,
                selector: None,
                cursor: Cursor::new(self.table.batch_size),
            },
        );
        debug!(table = %self.table.name, index, kind = label, "index added");
        Ok(())
    }

    /// Total number of entries in `index`.
    pub fn count_index(&self, index: &str) -> DataResult<u64> {
        if !self.table.has_index(index) {
            return Err(self.table.unknown_index(index));
        }
        self.backend.count_index(&self.table.name, index, None)
    }

    /// The index `index`, seeded with `selector`.
    ///
    /// Seeding with a different selector than last time abandons the
    /// index's pass in progress.
    pub fn index(self, index: &str, selector: &str) -> DataResult<IndexRef<'a>> {
        let TableRef { backend, table, .. } = self;
        let Table { name, indexes, .. } = table;
        let unknown = || DataError::UnknownIndex {
            table: name.clone(),
            index: index.to_string(),
        };
        let entry = indexes.get_mut(index).ok_or_else(unknown)?;

        if entry.selector.as_deref() != Some(selector) {
            entry.cursor.reset();
            entry.selector = Some(selector.to_string());
        }
        let Index {
            name: index_name,
            kind,
            selector,
            cursor,
        } = entry;
        let selector: &'a Option<String> = selector;

        Ok(IndexRef {
            backend,
            table: name,
            name: index_name,
            kind: *kind,
            selector: selector.as_deref().unwrap_or_default(),
            cursor,
        })
    }

    pub fn cursor_state(&self) -> CursorState {
        self.table.cursor.state()
    }
}

impl RecordSource for TableRef<'_> {
    fn step(&mut self) -> DataResult<Option<Record>> {
        let backend = &*self.backend;
        let name = &self.table.name;
        self.table
            .cursor
            .step(|after, limit| backend.scan(name, after, limit))
    }

    fn reset(&mut self) {
        self.table.cursor.reset();
    }
}

/// An index handle seeded with a selector.
pub struct IndexRef<'a> {
    backend: &'a (dyn StorageBackend + 'static),
    table: &'a str,
    name: &'a str,
    kind: &'static str,
    selector: &'a str,
    cursor: &'a mut Cursor,
}

impl IndexRef<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn table(&self) -> &str {
        self.table
    }

    /// `derived` or `column`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn selector(&self) -> &str {
        self.selector
    }

    /// Number of records whose secondary key equals the selector.
    pub fn count(&self) -> DataResult<u64> {
        self.backend
            .count_index(self.table, self.name, Some(self.selector))
    }

    pub fn cursor_state(&self) -> CursorState {
        self.cursor.state()
    }
}

impl RecordSource for IndexRef<'_> {
    fn step(&mut self) -> DataResult<Option<Record>> {
        let (backend, table, name, selector) = (self.backend, self.table, self.name, self.selector);
        self.cursor
            .step(|after, limit| backend.seek_index(table, name, selector, after, limit))
    }

    fn reset(&mut self) {
        self.cursor.reset();
    }
}

/// Either a whole table or an index lookup, as resolved by
/// [`crate::Data::handle`].
pub enum TableHandle<'a> {
    Table(TableRef<'a>),
    Index(IndexRef<'a>),
}

impl TableHandle<'_> {
    /// Records the handle would yield: the table size, or the selector's matches.
    pub fn count(&self) -> DataResult<u64> {
        match self {
            TableHandle::Table(table) => table.count(),
            TableHandle::Index(index) => index.count(),
        }
    }

    pub fn cursor_state(&self) -> CursorState {
        match self {
            TableHandle::Table(table) => table.cursor_state(),
            TableHandle::Index(index) => index.cursor_state(),
        }
    }
}

impl RecordSource for TableHandle<'_> {
    fn step(&mut self) -> DataResult<Option<Record>> {
        match self {
            TableHandle::Table(table) => table.step(),
            TableHandle::Index(index) => index.step(),
        }
    }

    fn reset(&mut self) {
        match self {
            TableHandle::Table(table) => table.reset(),
            TableHandle::Index(index) => index.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn setup() -> (InMemoryBackend, Table, BTreeSet<String>) {
        let mut backend = InMemoryBackend::new();
        backend.open_table("games").unwrap();
        let names = BTreeSet::from(["games".to_string(), "comps".to_string()]);
        (backend, Table::new("games", 2), names)
    }

    #[test]
    fn test_table_ref_crud_and_scan() {
        let (mut backend, mut table, names) = setup();
        let mut games = TableRef::new(&mut backend, &mut table, &names);

        games.put("game1", "germany").unwrap();
        games.put("game2", "usa").unwrap();
        games.put("game3", "italy").unwrap();
        assert_eq!(games.get("game2").unwrap(), Some("usa".to_string()));
        assert_eq!(games.count().unwrap(), 3);

        let all: Vec<Record> = games.records().collect::<DataResult<_>>().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(games.cursor_state(), CursorState::Exhausted);

        assert!(games.delete("game1").unwrap());
        assert!(!games.delete("game1").unwrap());
    }

    #[test]
    fn test_add_index_rejects_collisions() {
        let (mut backend, mut table, names) = setup();
        let mut games = TableRef::new(&mut backend, &mut table, &names);

        let err = games
            .add_index("comps", IndexKind::derived(|_, _| None))
            .unwrap_err();
        assert!(matches!(err, DataError::DuplicateIndex { .. }));

        games.add_index("date", IndexKind::derived(|_, _| None)).unwrap();
        let err = games
            .add_index("date", IndexKind::derived(|_, _| None))
            .unwrap_err();
        assert!(matches!(err, DataError::DuplicateIndex { .. }));

        for variant in ["Date", "COMPS", "Games"] {
            let err = games
                .add_index(variant, IndexKind::derived(|_, _| None))
                .unwrap_err();
            assert!(matches!(err, DataError::DuplicateIndex { .. }), "{variant}");
        }

        assert!(matches!(
            games.add_index("bad name", IndexKind::Column),
            Err(DataError::InvalidName(_))
        ));
    }

    #[test]
    fn test_unknown_index() {
        let (mut backend, mut table, names) = setup();
        let games = TableRef::new(&mut backend, &mut table, &names);
        assert!(matches!(games.count_index("date"), Err(DataError::UnknownIndex { .. })));
        assert!(matches!(
            games.index("date", "2020-10-26"),
            Err(DataError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn test_put_indexed_checks_registry_first() {
        let (mut backend, mut table, names) = setup();
        let mut games = TableRef::new(&mut backend, &mut table, &names);
        let err = games.put_indexed("game1", "germany", &[("date", "x")]).unwrap_err();
        assert!(matches!(err, DataError::UnknownIndex { .. }));
    }

    #[test]
    fn test_index_ref_lookup_and_reseed() {
        let (mut backend, mut table, names) = setup();
        {
            let mut games = TableRef::new(&mut backend, &mut table, &names);
            games
                .add_index("country", IndexKind::derived(|_, value| Some(value.to_string())))
                .unwrap();
            for (key, value) in [("a", "de"), ("b", "us"), ("c", "de"), ("d", "de")] {
                games.put(key, value).unwrap();
            }
        }

        {
            let games = TableRef::new(&mut backend, &mut table, &names);
            let mut germany = games.index("country", "de").unwrap();
            assert_eq!(germany.selector(), "de");
            assert_eq!(germany.kind(), "derived");
            assert_eq!(germany.count().unwrap(), 3);
            assert_eq!(germany.step().unwrap().unwrap().0, "a");
            assert_eq!(germany.cursor_state(), CursorState::Positioned);
        }
        assert_eq!(table.open_cursors(), 1);

        {
            // Same selector continues the pass.
            let games = TableRef::new(&mut backend, &mut table, &names);
            let mut germany = games.index("country", "de").unwrap();
            assert_eq!(germany.step().unwrap().unwrap().0, "c");
        }

        {
            // A new selector starts over.
            let games = TableRef::new(&mut backend, &mut table, &names);
            let mut usa = games.index("country", "us").unwrap();
            let hits: Vec<Record> = usa.records().collect::<DataResult<_>>().unwrap();
            assert_eq!(hits, vec![("b".to_string(), "us".to_string())]);
        }

        table.close_cursors();
        assert_eq!(table.open_cursors(), 0);
    }

    #[test]
    fn test_table_handle_dispatch() {
        let (mut backend, mut table, names) = setup();
        let mut handle = TableHandle::Table(TableRef::new(&mut backend, &mut table, &names));
        assert_eq!(handle.count().unwrap(), 0);
        assert!(handle.step().unwrap().is_none());
        assert_eq!(handle.cursor_state(), CursorState::Exhausted);
    }

    #[test]
    fn test_selector_new() {
        let selector = Selector::new("date", "2020-10-26");
        assert_eq!(selector.index, "date");
        assert_eq!(selector.value, "2020-10-26");
    }
}

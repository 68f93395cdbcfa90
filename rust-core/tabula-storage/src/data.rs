// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The `Data` facade: one storage root, one backend, a lazy table registry.
//
// Tables are opened on first reference and provisioned on the backend if
// they do not exist yet, so no operation ever fails with "unknown table".
// Finalisation (reset every cursor, commit, close the backend) runs exactly
// once, from `close`, from `scoped` on the way out of its body, or from
// `Drop` as a last resort.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::backend::{case_conflict, validate_name, IndexKind, StorageBackend};
use crate::config::{BackendKind, StoreConfig, DEFAULT_CURSOR_BATCH_SIZE};
use crate::error::{DataError, DataResult};
use crate::memory::InMemoryBackend;
use crate::table::{IndexRef, Selector, Table, TableHandle, TableRef};

/// Unified access to the tables of one storage root.
///
/// # Example
///
/// ```rust
/// use tabula_storage::{BackendKind, Data, IndexKind, RecordSource, StoreConfig};
///
/// let root = tempfile::tempdir().unwrap();
/// let data = Data::open(&StoreConfig::new(root.path(), BackendKind::Memory)).unwrap();
///
/// data.scoped(|data| {
///     data.put("games", "game1", "germany")?;
///     data.put("games", "game2", "usa")?;
///     data.add_index("games", "country", IndexKind::derived(|_, v| Some(v.to_string())))?;
///
///     let mut usa = data.index("games", "country", "usa")?;
///     let hits: Vec<_> = usa.records().collect::<Result<_, _>>()?;
///     assert_eq!(hits, vec![("game2".to_string(), "usa".to_string())]);
///     Ok(())
/// })
/// .unwrap();
/// ```
pub struct Data {
    root: PathBuf,
    batch_size: usize,
    backend: Option<Box<dyn StorageBackend>>,
    tables: HashMap<String, Table>,
    names: BTreeSet<String>,
}

impl Data {
    /// Open the store described by `config`, creating its root if needed.
    pub fn open(config: &StoreConfig) -> DataResult<Self> {
        config.validate()?;
        let root = config.root.clone();
        create_root(&root)?;

        let backend: Box<dyn StorageBackend> = match config.backend {
            #[cfg(feature = "redb-backend")]
            BackendKind::Ordered => Box::new(crate::redb_backend::RedbBackend::open(&root)?),
            #[cfg(feature = "sqlite-backend")]
            BackendKind::Relational => Box::new(crate::sqlite_backend::SqliteBackend::open(
                &root,
                &config.relational_file,
                config.thread_safe,
            )?),
            BackendKind::Memory => Box::new(InMemoryBackend::new()),
            #[allow(unreachable_patterns)]
            other => {
                return Err(DataError::Config(format!(
                    "the {other} backend is not compiled into this build"
                )))
            }
        };

        info!(
            root = %root.display(),
            backend = backend.name(),
            "opened data store"
        );
        Ok(Self::assemble(root, config.cursor_batch_size, backend))
    }

    /// Wrap an already constructed backend.
    pub fn with_backend(root: impl Into<PathBuf>, backend: impl StorageBackend + 'static) -> DataResult<Self> {
        let root = root.into();
        create_root(&root)?;
        debug!(root = %root.display(), backend = backend.name(), "attached backend");
        Ok(Self::assemble(root, DEFAULT_CURSOR_BATCH_SIZE, Box::new(backend)))
    }

    /// Entries fetched per cursor refill for tables opened from now on.
    pub fn with_cursor_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn assemble(root: PathBuf, batch_size: usize, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            root,
            batch_size: batch_size.max(1),
            backend: Some(backend),
            tables: HashMap::new(),
            names: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the backend, `None` once closed.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|backend| backend.name())
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Names of the tables opened so far, sorted.
    pub fn tables(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    /// Cursors across all tables and indexes that are in the middle of a pass.
    pub fn open_cursors(&self) -> usize {
        self.tables.values().map(Table::open_cursors).sum()
    }

    /// The table `name`, opening (and if needed provisioning) it first.
    pub fn table(&mut self, name: &str) -> DataResult<TableRef<'_>> {
        let Self {
            backend,
            tables,
            names,
            batch_size,
            ..
        } = self;
        let backend = backend.as_deref_mut().ok_or_else(DataError::closed)?;

        if !tables.contains_key(name) {
            validate_name(name)?;
            if let Some(existing) = names.iter().find(|known| known.eq_ignore_ascii_case(name)) {
                return Err(case_conflict(name, existing));
            }
            if let Some(owner) = tables.values().find(|table| table.has_index_ignoring_case(name)) {
                return Err(DataError::DuplicateIndex {
                    table: owner.name().to_string(),
                    index: name.to_string(),
                });
            }
            backend.open_table(name)?;
            names.insert(name.to_string());
            debug!(table = name, backend = backend.name(), "table opened");
        }

        let table = tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name, *batch_size));
        Ok(TableRef::new(backend, table, names))
    }

    /// Open `name` without doing anything else with it.
    pub fn open_table(&mut self, name: &str) -> DataResult<()> {
        self.table(name).map(|_| ())
    }

    pub fn put(&mut self, table: &str, key: &str, value: &str) -> DataResult<()> {
        self.table(table)?.put(key, value)
    }

    /// Upsert and set manually maintained index columns (relational engine).
    pub fn put_indexed(
        &mut self,
        table: &str,
        key: &str,
        value: &str,
        columns: &[(&str, &str)],
    ) -> DataResult<()> {
        self.table(table)?.put_indexed(key, value, columns)
    }

    /// `Ok(None)` when `key` is absent.
    pub fn get(&mut self, table: &str, key: &str) -> DataResult<Option<String>> {
        self.table(table)?.get(key)
    }

    /// Deleting an absent key is a no-op that returns `false`.
    pub fn delete(&mut self, table: &str, key: &str) -> DataResult<bool> {
        self.table(table)?.delete(key)
    }

    pub fn count(&mut self, table: &str) -> DataResult<u64> {
        self.table(table)?.count()
    }

    /// Structural integrity check; [`DataError::Corruption`] on failure.
    pub fn verify(&mut self, table: &str) -> DataResult<()> {
        self.table(table)?.verify()
    }

    /// Register secondary index `index` on `table`.
    pub fn add_index(&mut self, table: &str, index: &str, kind: IndexKind) -> DataResult<()> {
        self.table(table)?.add_index(index, kind)
    }

    /// The index `index` of `table`, seeded with `selector`.
    pub fn index(&mut self, table: &str, index: &str, selector: &str) -> DataResult<IndexRef<'_>> {
        self.table(table)?.index(index, selector)
    }

    /// Resolve a table, or an index lookup when `selector` is given.
    pub fn handle(&mut self, table: &str, selector: Option<&Selector>) -> DataResult<TableHandle<'_>> {
        let table = self.table(table)?;
        match selector {
            None => Ok(TableHandle::Table(table)),
            Some(selector) => table
                .index(&selector.index, &selector.value)
                .map(TableHandle::Index),
        }
    }

    /// Make buffered writes durable without closing.
    pub fn commit(&mut self) -> DataResult<()> {
        self.backend
            .as_deref_mut()
            .ok_or_else(DataError::closed)?
            .commit()
    }

    /// Reset every cursor, commit, and release the backend.
    ///
    /// Runs once; later calls return `Ok(())`. The backend is released even
    /// if the commit fails, and a commit failure is reported ahead of a
    /// close failure.
    pub fn close(&mut self) -> DataResult<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };

        for table in self.tables.values_mut() {
            table.close_cursors();
        }
        let tables = self.tables.len();
        self.tables.clear();
        self.names.clear();

        let name = backend.name();
        let committed = backend.commit();
        if let Err(err) = &committed {
            warn!(backend = name, error = %err, "commit failed while closing");
        }
        let closed = backend.close();

        if committed.is_ok() && closed.is_ok() {
            info!(root = %self.root.display(), backend = name, tables, "data store closed");
        }
        committed.and(closed)
    }

    /// Run `body` against this store, then finalise it on every exit path.
    ///
    /// A finalisation error takes priority over the body's error. A panic
    /// in `body` unwinds through `Drop`, which finalises as well.
    pub fn scoped<T, F>(mut self, body: F) -> DataResult<T>
    where
        F: FnOnce(&mut Data) -> DataResult<T>,
    {
        let outcome = body(&mut self);
        match (outcome, self.close()) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(exit)) => Err(exit),
            (Err(masked), Err(exit)) => {
                warn!(error = %masked, "error inside scope superseded by finalisation failure");
                Err(exit)
            }
        }
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("root", &self.root)
            .field("backend", &self.backend_name())
            .field("tables", &self.names)
            .finish()
    }
}

impl Drop for Data {
    fn drop(&mut self) {
        if self.backend.is_some() {
            if let Err(err) = self.close() {
                error!(root = %self.root.display(), error = %err, "failed to finalise data store on drop");
            }
        }
    }
}

fn create_root(root: &Path) -> DataResult<()> {
    std::fs::create_dir_all(root).map_err(|e| {
        DataError::Connection(format!("storage root {} is unusable: {e}", root.display()))
    })
}

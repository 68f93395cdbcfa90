// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tabula Storage
//
// One table/index API over interchangeable key-value engines. A `Data`
// facade owns a storage root and a backend; tables open lazily on first
// use, indexes are looked up by name and selector, and every table or index
// iterates through the same three-state cursor whichever engine sits below.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` trait every engine adapter implements.
// - [`config`] -- `StoreConfig` and engine selection.
// - [`cursor`] -- The cursor state machine and the `RecordSource` iterator protocol.
// - [`data`] -- The `Data` facade, lazy table registry and scoped finalisation.
// - [`env`] -- Cleanup and raw file verification utilities.
// - [`error`] -- The `DataError` taxonomy.
// - [`memory`] -- An in-memory `BTreeMap`-based ordered engine.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
// - [`redb_backend`] -- Ordered engine on redb (feature `redb-backend`).
// - [`sqlite_backend`] -- Relational engine on SQLite (feature `sqlite-backend`).
// - [`table`] -- Table and index handles.
//
// # Example
//
// ```rust
// use tabula_storage::{BackendKind, Data, IndexKind, RecordSource, StoreConfig};
//
// let root = tempfile::tempdir().unwrap();
// let config = StoreConfig::new(root.path(), BackendKind::Ordered);
//
// Data::open(&config).unwrap().scoped(|data| {
//     data.add_index("games", "date", IndexKind::derived(|key, _| {
//         Some(if key == "game1" { "2020-10-26" } else { "2020-11-26" }.to_string())
//     }))?;
//     data.put("games", "game1", "germany")?;
//     data.put("games", "game2", "usa")?;
//
//     let hits: Vec<_> = data
//         .index("games", "date", "2020-10-26")?
//         .records()
//         .collect::<Result<_, _>>()?;
//     assert_eq!(hits, vec![("game1".to_string(), "germany".to_string())]);
//     Ok(())
// }).unwrap();
// ```

pub mod backend;
pub mod config;
pub mod cursor;
pub mod data;
pub mod env;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod table;

// Persistent engines are feature-gated; both are on by default.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;
#[cfg(feature = "sqlite-backend")]
pub mod sqlite_backend;

// Re-export the most commonly used types at the crate root for convenience.
pub use backend::{IndexKind, KeyDeriver, Record, StorageBackend};
pub use config::{BackendKind, StoreConfig};
pub use cursor::{CursorState, RecordSource, Records};
pub use data::Data;
pub use env::{remove_env, verify_file};
pub use error::{DataError, DataResult};
pub use memory::InMemoryBackend;
pub use metrics::{BackendStats, MetricsBackend, StatsHandle};
pub use table::{IndexRef, Selector, TableHandle, TableRef};

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "sqlite-backend")]
pub use sqlite_backend::SqliteBackend;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Environment utilities that work on a storage root or a raw file without a
// `Data` facade.

use std::path::Path;

use tracing::{debug, info};

use crate::config::BackendKind;
use crate::error::{DataError, DataResult};

/// File name prefix reserved for engine bookkeeping files.
pub const RESERVED_PREFIX: &str = "__";

/// Delete every regular file directly under `root` whose name starts with
/// `__`, returning how many were removed.
///
/// Table data files are never touched: table names cannot carry the prefix.
pub fn remove_env(root: impl AsRef<Path>) -> DataResult<usize> {
    let root = root.as_ref();
    let mut removed = 0;

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(RESERVED_PREFIX) {
            std::fs::remove_file(entry.path())?;
            debug!(file = %entry.path().display(), "removed environment file");
            removed += 1;
        }
    }

    info!(root = %root.display(), removed, "environment cleaned");
    Ok(removed)
}

/// Run the structural check of `kind`'s engine on a database file.
///
/// The file must not be open in a live store.
pub fn verify_file(kind: BackendKind, path: impl AsRef<Path>) -> DataResult<()> {
    let path = path.as_ref();
    match kind {
        #[cfg(feature = "redb-backend")]
        BackendKind::Ordered => crate::redb_backend::RedbBackend::verify_file(path)?,
        #[cfg(feature = "sqlite-backend")]
        BackendKind::Relational => crate::sqlite_backend::SqliteBackend::verify_file(path)?,
        BackendKind::Memory => {
            return Err(DataError::unsupported("memory", "file verification"));
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(DataError::Config(format!(
                "the {other} backend is not compiled into this build"
            )))
        }
    }
    info!(path = %path.display(), backend = %kind, "file verified");
    Ok(())
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for the Tabula storage facade.
//
// Callers see one small, engine-independent error set whichever backend is
// in use. Engine adapters translate redb and SQLite failures into these
// variants at their boundary; raw engine errors never escape. There is no
// "unknown table" variant: referencing a table that does not exist yet
// creates it.

use std::fmt::Display;

use thiserror::Error;

/// Errors that can occur when using a [`crate::Data`] store.
#[derive(Debug, Error)]
pub enum DataError {
    /// The storage root is unusable, the engine could not initialise, or the
    /// store has already been closed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A selector or index column names an index that was never registered.
    #[error("unknown index '{index}' on table '{table}'")]
    UnknownIndex {
        /// Table the lookup was made against.
        table: String,
        /// Index name that was not found.
        index: String,
    },

    /// An index name collides with a table name or another index.
    #[error("index name '{index}' on table '{table}' is already taken")]
    DuplicateIndex {
        /// Table the index was being added to.
        table: String,
        /// The colliding name.
        index: String,
    },

    /// Structural verification reported an inconsistency.
    #[error("corruption detected in {target}: {reason}")]
    Corruption {
        /// Table name or file path that failed verification.
        target: String,
        /// Engine-provided description of the problem.
        reason: String,
    },

    /// A lower-level engine failure during a put/get/delete/iterate/commit/close.
    #[error("{backend} backend failed to {operation}: {reason}")]
    Backend {
        /// Name of the engine that failed.
        backend: &'static str,
        /// Operation being performed.
        operation: String,
        /// Engine error message.
        reason: String,
    },

    /// The operation has no meaning on this engine.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        /// Name of the engine.
        backend: &'static str,
        /// Operation that was requested.
        operation: String,
    },

    /// A table or index name is not acceptable.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure in an environment utility.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Wrap an engine failure as a [`DataError::Backend`].
    pub fn backend(backend: &'static str, operation: impl Into<String>, err: impl Display) -> Self {
        DataError::Backend {
            backend,
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Build a [`DataError::Unsupported`].
    pub fn unsupported(backend: &'static str, operation: impl Into<String>) -> Self {
        DataError::Unsupported {
            backend,
            operation: operation.into(),
        }
    }

    /// Error returned by every operation on a store that has been closed.
    pub(crate) fn closed() -> Self {
        DataError::Connection("store is closed".to_string())
    }
}

/// Convenience alias for results returned by this crate.
pub type DataResult<T> = Result<T, DataError>;

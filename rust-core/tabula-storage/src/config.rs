// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store configuration.
//!
//! Defaults:
//! - root: current directory
//! - backend: ordered (redb)
//! - thread_safe: true
//! - relational_file: `data.sqlite3`
//! - cursor_batch_size: 128
//!
//! Environment overrides use the `TABULA_` prefix, see [`StoreConfig::from_env`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// Default number of entries fetched per cursor refill.
pub const DEFAULT_CURSOR_BATCH_SIZE: usize = 128;

/// Default relational database file name under the storage root.
pub const DEFAULT_RELATIONAL_FILE: &str = "data.sqlite3";

/// Which storage engine backs a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Ordered B-tree engine (redb), one file per table.
    Ordered,
    /// Relational engine (SQLite), one file per store.
    Relational,
    /// Process-local ordered map, nothing touches disk.
    Memory,
}

impl BackendKind {
    /// Lowercase name as used in configuration files and the environment.
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Ordered => "ordered",
            BackendKind::Relational => "relational",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" | "redb" | "btree" => Ok(BackendKind::Ordered),
            "relational" | "sqlite" => Ok(BackendKind::Relational),
            "memory" => Ok(BackendKind::Memory),
            other => Err(DataError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Configuration for opening a [`crate::Data`] store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Storage root directory; created on open if absent.
    pub root: PathBuf,
    /// Engine selection.
    pub backend: BackendKind,
    /// Open the relational engine in serialized (full-mutex) threading mode.
    ///
    /// The ordered engine synchronises internally regardless. Concurrent
    /// writers from several stores against one root rely on this being set.
    pub thread_safe: bool,
    /// Database file name under `root` used by the relational engine.
    pub relational_file: String,
    /// Entries fetched per cursor refill.
    pub cursor_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            backend: BackendKind::Ordered,
            thread_safe: true,
            relational_file: DEFAULT_RELATIONAL_FILE.to_string(),
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    /// Configuration for `backend` rooted at `root`, other fields defaulted.
    pub fn new(root: impl Into<PathBuf>, backend: BackendKind) -> Self {
        Self {
            root: root.into(),
            backend,
            ..Default::default()
        }
    }

    /// Defaults overridden by `TABULA_ROOT`, `TABULA_BACKEND`,
    /// `TABULA_THREAD_SAFE`, `TABULA_RELATIONAL_FILE` and `TABULA_CURSOR_BATCH`.
    pub fn from_env() -> DataResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DataResult<Self> {
        let mut config = Self::default();

        if let Some(root) = lookup("TABULA_ROOT") {
            config.root = PathBuf::from(root);
        }
        if let Some(backend) = lookup("TABULA_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(flag) = lookup("TABULA_THREAD_SAFE") {
            config.thread_safe = parse_flag("TABULA_THREAD_SAFE", &flag)?;
        }
        if let Some(file) = lookup("TABULA_RELATIONAL_FILE") {
            config.relational_file = file;
        }
        if let Some(batch) = lookup("TABULA_CURSOR_BATCH") {
            config.cursor_batch_size = batch.trim().parse().map_err(|e| {
                DataError::Config(format!("TABULA_CURSOR_BATCH '{batch}': {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration document. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| DataError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no store can be opened with.
    pub fn validate(&self) -> DataResult<()> {
        if self.cursor_batch_size == 0 {
            return Err(DataError::Config(
                "cursor_batch_size must be at least 1".to_string(),
            ));
        }
        if self.relational_file.trim().is_empty() {
            return Err(DataError::Config(
                "relational_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(name: &str, raw: &str) -> DataResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DataError::Config(format!("{name} '{other}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, BackendKind::Ordered);
        assert!(config.thread_safe);
        assert_eq!(config.relational_file, "data.sqlite3");
        assert_eq!(config.cursor_batch_size, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Relational);
        assert_eq!("Ordered".parse::<BackendKind>().unwrap(), BackendKind::Ordered);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("berkeley".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("TABULA_ROOT", "/tmp/tabula"),
            ("TABULA_BACKEND", "relational"),
            ("TABULA_THREAD_SAFE", "off"),
            ("TABULA_CURSOR_BATCH", "7"),
        ]))
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/tabula"));
        assert_eq!(config.backend, BackendKind::Relational);
        assert!(!config.thread_safe);
        assert_eq!(config.cursor_batch_size, 7);
    }

    #[test]
    fn test_from_lookup_rejects_zero_batch() {
        let result = StoreConfig::from_lookup(lookup_from(&[("TABULA_CURSOR_BATCH", "0")]));
        assert!(matches!(result, Err(DataError::Config(_))));
    }

    #[test]
    fn test_from_lookup_rejects_bad_flag() {
        let result = StoreConfig::from_lookup(lookup_from(&[("TABULA_THREAD_SAFE", "maybe")]));
        assert!(matches!(result, Err(DataError::Config(_))));
    }

    #[test]
    fn test_json_file_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabula.json");
        std::fs::write(&path, r#"{"backend": "memory", "cursor_batch_size": 3}"#).unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.cursor_batch_size, 3);
        assert_eq!(config.relational_file, DEFAULT_RELATIONAL_FILE);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = StoreConfig::new("/var/lib/tabula", BackendKind::Relational);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"relational\""));
        let parsed: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}

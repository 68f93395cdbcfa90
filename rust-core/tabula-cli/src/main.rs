// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! `tabula`: command-line access to a Tabula store.
//!
//! Every command that touches tables runs inside `Data::scoped`, so writes
//! are committed and the store is closed however the command ends.

mod formatter;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tabula_storage::{
    remove_env, verify_file, BackendKind, Data, DataError, DataResult, InMemoryBackend, IndexKind,
    MetricsBackend, Record, RecordSource, RedbBackend, SqliteBackend, StatsHandle, StorageBackend,
    StoreConfig,
};
use tracing::debug;

use formatter::{format_records, format_stats};

/// Tabula version string, pulled from Cargo.toml at compile time.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tabula: one table/index interface over several storage engines.
#[derive(Parser, Debug)]
#[command(name = "tabula", version = VERSION, about = "Key-value tables over redb or SQLite")]
struct Cli {
    /// JSON configuration file; otherwise TABULA_* environment variables apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage root directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Storage engine: ordered, relational or memory.
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Print operation statistics after the command.
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert or overwrite a record.
    Put {
        table: String,
        key: String,
        value: String,
        /// Set an index column, as NAME=VALUE (relational engine). Repeatable.
        #[arg(long = "index", value_parser = parse_assignment)]
        index: Vec<(String, String)>,
    },
    /// Print the value stored under a key.
    Get { table: String, key: String },
    /// Remove a record.
    Delete { table: String, key: String },
    /// Print the number of records in a table.
    Count { table: String },
    /// List every record of a table in key order.
    Scan { table: String },
    /// List the records whose index column equals VALUE (relational engine).
    Lookup {
        table: String,
        index: String,
        value: String,
    },
    /// Run the engine's integrity check on a table.
    Verify { table: String },
    /// Run the engine's integrity check on a database file that is not in use.
    VerifyFile { path: PathBuf },
    /// Delete engine bookkeeping files (names starting with `__`) under the root.
    Clean,
}

/// Parse `NAME=VALUE`.
fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

fn load_config(cli: &Cli) -> DataResult<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_json_file(path)?,
        None => StoreConfig::from_env()?,
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    Ok(config)
}

fn metered<B: StorageBackend + 'static>(config: &StoreConfig, backend: B) -> DataResult<(Data, StatsHandle)> {
    let backend = MetricsBackend::new(backend);
    let handle = backend.handle();
    let data = Data::with_backend(&config.root, backend)?.with_cursor_batch_size(config.cursor_batch_size);
    Ok((data, handle))
}

fn open_store(config: &StoreConfig, stats: bool) -> DataResult<(Data, Option<StatsHandle>)> {
    if !stats {
        return Ok((Data::open(config)?, None));
    }
    let (data, handle) = match config.backend {
        BackendKind::Ordered => metered(config, RedbBackend::open(&config.root)?)?,
        BackendKind::Relational => metered(
            config,
            SqliteBackend::open(&config.root, &config.relational_file, config.thread_safe)?,
        )?,
        BackendKind::Memory => metered(config, InMemoryBackend::new())?,
    };
    Ok((data, Some(handle)))
}

/// Register every column in `columns` on `table`; existing columns are kept.
fn register_columns<'c>(data: &mut Data, table: &str, columns: impl IntoIterator<Item = &'c str>) -> DataResult<()> {
    for column in columns {
        if !data.table(table)?.indexes().any(|known| known == column) {
            data.add_index(table, column, IndexKind::Column)?;
        }
    }
    Ok(())
}

fn run(data: &mut Data, command: &Command) -> DataResult<String> {
    match command {
        Command::Put {
            table,
            key,
            value,
            index,
        } => {
            if index.is_empty() {
                data.put(table, key, value)?;
            } else {
                register_columns(data, table, index.iter().map(|(name, _)| name.as_str()))?;
                let columns: Vec<(&str, &str)> = index
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str()))
                    .collect();
                data.put_indexed(table, key, value, &columns)?;
            }
            Ok(format!("stored {table}/{key}"))
        }
        Command::Get { table, key } => Ok(data
            .get(table, key)?
            .unwrap_or_else(|| format!("{table}/{key} not found"))),
        Command::Delete { table, key } => Ok(if data.delete(table, key)? {
            format!("deleted {table}/{key}")
        } else {
            format!("{table}/{key} not found")
        }),
        Command::Count { table } => Ok(data.count(table)?.to_string()),
        Command::Scan { table } => {
            let records: Vec<Record> = data.table(table)?.records().collect::<DataResult<_>>()?;
            Ok(format_records(&records))
        }
        Command::Lookup {
            table,
            index,
            value,
        } => {
            register_columns(data, table, [index.as_str()])?;
            let records: Vec<Record> = data
                .index(table, index, value)?
                .records()
                .collect::<DataResult<_>>()?;
            Ok(format_records(&records))
        }
        Command::Verify { table } => {
            data.verify(table)?;
            Ok(format!("{table}: ok"))
        }
        Command::VerifyFile { .. } | Command::Clean => Err(DataError::Config(
            "command does not operate on an open store".to_string(),
        )),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    debug!(?config, "configuration loaded");

    match &cli.command {
        Command::Clean => {
            let removed = remove_env(&config.root)?;
            println!("removed {removed} file{}", if removed == 1 { "" } else { "s" });
        }
        Command::VerifyFile { path } => {
            verify_file(config.backend, path)?;
            println!("{}: ok", path.display());
        }
        command => {
            let (data, stats) = open_store(&config, cli.stats)?;
            let output = data.scoped(|data| run(data, command))?;
            println!("{output}");
            if let Some(stats) = stats {
                println!("{}", format_stats(&stats.snapshot()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> (Data, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let data = Data::open(&StoreConfig::new(dir.path(), BackendKind::Memory)).unwrap();
        (data, dir)
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("date=2020-10-26").unwrap(),
            ("date".to_string(), "2020-10-26".to_string())
        );
        assert_eq!(parse_assignment("note=a=b").unwrap().1, "a=b");
        assert!(parse_assignment("date").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_cli_parses_put_with_indexes() {
        let cli = Cli::try_parse_from([
            "tabula", "--backend", "sqlite", "put", "games", "game1", "germany", "--index",
            "date=2020-10-26",
        ])
        .unwrap();
        assert_eq!(cli.backend, Some(BackendKind::Relational));
        match cli.command {
            Command::Put { index, .. } => {
                assert_eq!(index, vec![("date".to_string(), "2020-10-26".to_string())]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_put_get_count_scan() {
        let (mut data, _dir) = memory_store();
        let put = Command::Put {
            table: "games".into(),
            key: "game1".into(),
            value: "germany".into(),
            index: Vec::new(),
        };
        run(&mut data, &put).unwrap();

        let got = run(&mut data, &Command::Get { table: "games".into(), key: "game1".into() }).unwrap();
        assert_eq!(got, "germany");
        let count = run(&mut data, &Command::Count { table: "games".into() }).unwrap();
        assert_eq!(count, "1");
        let scan = run(&mut data, &Command::Scan { table: "games".into() }).unwrap();
        assert!(scan.contains("germany"));
    }

    #[test]
    fn test_run_lookup_on_relational_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), BackendKind::Relational);
        let mut data = Data::open(&config).unwrap();
        let put = Command::Put {
            table: "games".into(),
            key: "game1".into(),
            value: "germany".into(),
            index: vec![("date".into(), "2020-10-26".into())],
        };
        run(&mut data, &put).unwrap();

        let lookup = Command::Lookup {
            table: "games".into(),
            index: "date".into(),
            value: "2020-10-26".into(),
        };
        let out = run(&mut data, &lookup).unwrap();
        assert!(out.contains("game1"));
        assert!(out.ends_with("(1 row)"));
    }

    #[test]
    fn test_open_store_with_stats() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), BackendKind::Memory);
        let (data, stats) = open_store(&config, true).unwrap();
        data.scoped(|data| data.put("games", "game1", "germany")).unwrap();
        assert_eq!(stats.unwrap().snapshot().put_count, 1);
    }
}

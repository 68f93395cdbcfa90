// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for Tabula storage backends.
//
// Wraps any `StorageBackend` and transparently collects operation counts,
// latency sums, and byte transfer totals. The statistics live behind a
// shared handle that survives the backend itself, so a caller can still
// observe whether a store was committed and closed after the facade that
// owned it is gone.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::backend::{IndexKind, Record, StorageBackend};
use crate::error::DataResult;

/// Accumulated statistics for a storage backend.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsBackend`] that owns them, unless explicitly reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendStats {
    /// Number of `get` operations performed.
    pub get_count: u64,
    /// Number of `put` and `put_indexed` operations performed.
    pub put_count: u64,
    /// Number of `delete` operations performed.
    pub delete_count: u64,
    /// Number of `scan` and `seek_index` batches fetched.
    pub scan_count: u64,
    /// Number of `commit` calls.
    pub commit_count: u64,
    /// Number of `close` calls (0 or 1).
    pub close_count: u64,
    /// Cumulative wall-clock latency of all `get` calls, in milliseconds.
    pub get_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of all `put` calls, in milliseconds.
    pub put_latency_sum_ms: f64,
    /// Total value bytes returned by `get`, plus key and value bytes of scans.
    pub total_bytes_read: u64,
    /// Total value bytes written by successful puts.
    pub total_bytes_written: u64,
}

/// Shared view of a [`MetricsBackend`]'s statistics.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle(Arc<RwLock<BackendStats>>);

impl StatsHandle {
    /// Return a snapshot of the current statistics.
    pub fn snapshot(&self) -> BackendStats {
        self.read().clone()
    }

    /// Reset all statistics to zero.
    pub fn reset(&self) {
        *self.write() = BackendStats::default();
    }

    // A panic while the lock is held cannot leave the counters inconsistent.
    fn read(&self) -> RwLockReadGuard<'_, BackendStats> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BackendStats> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A storage backend wrapper that collects operation metrics.
///
/// Delegates every operation to an inner backend while measuring wall-clock
/// latency and counting invocations.
///
/// # Example
///
/// ```rust
/// use tabula_storage::backend::StorageBackend;
/// use tabula_storage::memory::InMemoryBackend;
/// use tabula_storage::metrics::MetricsBackend;
///
/// let mut metered = MetricsBackend::new(InMemoryBackend::new());
/// metered.open_table("games").unwrap();
/// metered.put("games", "game1", "germany").unwrap();
/// metered.get("games", "game1").unwrap();
///
/// let stats = metered.stats();
/// assert_eq!(stats.put_count, 1);
/// assert_eq!(stats.get_count, 1);
/// ```
pub struct MetricsBackend<B: StorageBackend> {
    /// The wrapped backend that performs the actual storage operations.
    inner: B,
    stats: StatsHandle,
}

impl<B: StorageBackend> MetricsBackend<B> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: StatsHandle::default(),
        }
    }

    /// Return a snapshot of the current statistics.
    pub fn stats(&self) -> BackendStats {
        self.stats.snapshot()
    }

    /// A handle that keeps reporting after this backend is closed or dropped.
    pub fn handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// Reset all statistics to zero.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn record_put(&self, started: Instant, value: &str, ok: bool) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut s = self.stats.write();
        s.put_count += 1;
        s.put_latency_sum_ms += elapsed_ms;
        if ok {
            s.total_bytes_written += value.len() as u64;
        }
    }

    fn record_scan(&self, result: &DataResult<Vec<Record>>) {
        let mut s = self.stats.write();
        s.scan_count += 1;
        if let Ok(entries) = result {
            let bytes: u64 = entries
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum();
            s.total_bytes_read += bytes;
        }
    }
}

impl<B: StorageBackend> StorageBackend for MetricsBackend<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn open_table(&mut self, table: &str) -> DataResult<()> {
        self.inner.open_table(table)
    }

    fn put(&mut self, table: &str, key: &str, value: &str) -> DataResult<()> {
        let start = Instant::now();
        let result = self.inner.put(table, key, value);
        self.record_put(start, value, result.is_ok());
        result
    }

    fn put_indexed(
        &mut self,
        table: &str,
        key: &str,
        value: &str,
        columns: &[(&str, &str)],
    ) -> DataResult<()> {
        let start = Instant::now();
        let result = self.inner.put_indexed(table, key, value, columns);
        self.record_put(start, value, result.is_ok());
        result
    }

    fn get(&self, table: &str, key: &str) -> DataResult<Option<String>> {
        let start = Instant::now();
        let result = self.inner.get(table, key);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut s = self.stats.write();
        s.get_count += 1;
        s.get_latency_sum_ms += elapsed_ms;
        if let Ok(Some(ref val)) = result {
            s.total_bytes_read += val.len() as u64;
        }

        result
    }

    fn delete(&mut self, table: &str, key: &str) -> DataResult<bool> {
        self.stats.write().delete_count += 1;
        self.inner.delete(table, key)
    }

    fn count(&self, table: &str) -> DataResult<u64> {
        self.inner.count(table)
    }

    fn verify(&mut self, table: &str) -> DataResult<()> {
        self.inner.verify(table)
    }

    fn scan(&self, table: &str, after: Option<&str>, limit: usize) -> DataResult<Vec<Record>> {
        let result = self.inner.scan(table, after, limit);
        self.record_scan(&result);
        result
    }

    fn add_index(&mut self, table: &str, index: &str, kind: IndexKind) -> DataResult<()> {
        self.inner.add_index(table, index, kind)
    }

    fn seek_index(
        &self,
        table: &str,
        index: &str,
        selector: &str,
        after: Option<&str>,
        limit: usize,
    ) -> DataResult<Vec<Record>> {
        let result = self.inner.seek_index(table, index, selector, after, limit);
        self.record_scan(&result);
        result
    }

    fn count_index(&self, table: &str, index: &str, selector: Option<&str>) -> DataResult<u64> {
        self.inner.count_index(table, index, selector)
    }

    fn commit(&mut self) -> DataResult<()> {
        self.stats.write().commit_count += 1;
        self.inner.commit()
    }

    fn close(self: Box<Self>) -> DataResult<()> {
        let MetricsBackend { inner, stats } = *self;
        stats.write().close_count += 1;
        Box::new(inner).close()
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! Output formatting for `tabula` commands.

use comfy_table::{Cell, ContentArrangement, Table};
use tabula_storage::{BackendStats, Record};

/// Render records as a Key | Value table followed by a row count.
pub fn format_records(records: &[Record]) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Key"), Cell::new("Value")]);

    for (key, value) in records {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }

    let row_count = records.len();
    format!("{table}\n({row_count} row{})", if row_count == 1 { "" } else { "s" })
}

/// Render operation statistics as a two-column table (Metric | Value).
pub fn format_stats(stats: &BackendStats) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Metric"), Cell::new("Value")]);

    let rows = [
        ("gets", stats.get_count.to_string()),
        ("puts", stats.put_count.to_string()),
        ("deletes", stats.delete_count.to_string()),
        ("scan batches", stats.scan_count.to_string()),
        ("get latency (ms)", format!("{:.3}", stats.get_latency_sum_ms)),
        ("put latency (ms)", format!("{:.3}", stats.put_latency_sum_ms)),
        ("bytes read", stats.total_bytes_read.to_string()),
        ("bytes written", stats.total_bytes_written.to_string()),
    ];
    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }

    table.to_string()
}

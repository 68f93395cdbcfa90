// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for name validation and configuration parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use tabula_storage::backend::validate_name;
use tabula_storage::{BackendKind, StoreConfig};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Accepted names are safe to use as file names and SQL identifiers.
        if validate_name(s).is_ok() {
            assert!(!s.is_empty());
            assert!(s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'));
            assert!(!s.starts_with("__"));
        }

        let _ = s.parse::<BackendKind>();

        // Malformed environment values must be rejected, never panic.
        if s.len() < 4096 {
            let lookup = |name: &str| (name == "TABULA_CURSOR_BATCH").then(|| s.to_string());
            let _ = StoreConfig::from_lookup(lookup);
        }
    }
});

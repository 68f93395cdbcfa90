// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for the facade and cursor protocol over the memory engine

#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use tabula_storage::{Data, InMemoryBackend, IndexKind, RecordSource};

fuzz_target!(|data: &[u8]| {
    let Some((&batch, ops)) = data.split_first() else {
        return;
    };
    let root = std::env::temp_dir().join("tabula-fuzz");
    let Ok(store) = Data::with_backend(&root, InMemoryBackend::new()) else {
        return;
    };
    let mut store = store.with_cursor_batch_size(usize::from(batch % 8) + 1);
    let _ = store.add_index(
        "t",
        "parity",
        IndexKind::derived(|_, value| Some((value.len() % 2).to_string())),
    );
    let mut model = BTreeMap::new();

    // Each op is two bytes: opcode and key; values derive from both.
    for pair in ops.chunks_exact(2) {
        let key = format!("k{}", pair[1] % 16);
        match pair[0] % 4 {
            0 | 1 => {
                let value = "v".repeat(usize::from(pair[0] / 4 % 5));
                store.put("t", &key, &value).unwrap();
                model.insert(key, value);
            }
            2 => {
                assert_eq!(store.delete("t", &key).unwrap(), model.remove(&key).is_some());
            }
            _ => {
                // Single step; the next full pass must still be complete.
                let _ = store.table("t").unwrap().step().unwrap();
            }
        }
    }

    let scanned: Vec<_> = store
        .table("t")
        .unwrap()
        .records()
        .collect::<Result<_, _>>()
        .unwrap();
    let expected: Vec<_> = model.clone().into_iter().collect();
    assert_eq!(scanned, expected);

    let even = model.values().filter(|v| v.len() % 2 == 0).count() as u64;
    assert_eq!(store.index("t", "parity", "0").unwrap().count().unwrap(), even);

    store.close().unwrap();
    assert_eq!(store.open_cursors(), 0);
});

// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for Tabula storage
//!
//! Each engine is driven with random put/delete sequences and compared
//! against a `BTreeMap` model.

use std::collections::BTreeMap;

use proptest::prelude::*;
use tabula_storage::{BackendKind, Data, DataResult, IndexKind, Record, RecordSource, StoreConfig};

#[derive(Debug, Clone)]
enum Op {
    Put(String, String),
    Delete(String),
}

/// Generate keys from a small alphabet so puts and deletes collide often
fn arb_key() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

/// Generate values, including the empty string
fn arb_value() -> impl Strategy<Value = String> {
    "[a-z0-9]{0,6}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (arb_key(), arb_value()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => arb_key().prop_map(Op::Delete),
    ]
}

fn arb_backend() -> impl Strategy<Value = BackendKind> {
    prop_oneof![
        Just(BackendKind::Ordered),
        Just(BackendKind::Relational),
        Just(BackendKind::Memory),
    ]
}

fn first_char(value: &str) -> Option<String> {
    value.chars().next().map(String::from)
}

fn apply(data: &mut Data, model: &mut BTreeMap<String, String>, op: &Op) -> DataResult<()> {
    match op {
        Op::Put(key, value) => {
            data.put("items", key, value)?;
            model.insert(key.clone(), value.clone());
        }
        Op::Delete(key) => {
            let existed = data.delete("items", key)?;
            assert_eq!(existed, model.remove(key).is_some());
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_store_matches_model(
        kind in arb_backend(),
        batch in 1usize..5,
        ops in prop::collection::vec(arb_op(), 0..40)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            cursor_batch_size: batch,
            ..StoreConfig::new(dir.path(), kind)
        };
        let mut data = Data::open(&config).unwrap();
        let mut model = BTreeMap::new();

        for op in &ops {
            apply(&mut data, &mut model, op).unwrap();
        }

        prop_assert_eq!(data.count("items").unwrap(), model.len() as u64);
        for key in model.keys() {
            let got = data.get("items", key).unwrap();
            prop_assert_eq!(got.as_ref(), model.get(key));
        }

        let scanned: Vec<Record> = data
            .table("items")
            .unwrap()
            .records()
            .collect::<DataResult<_>>()
            .unwrap();
        let expected: Vec<Record> = model.into_iter().collect();
        prop_assert_eq!(scanned, expected);

        data.close().unwrap();
    }

    #[test]
    fn test_derived_index_matches_model(
        ordered in any::<bool>(),
        ops in prop::collection::vec(arb_op(), 0..40),
        selector in "[a-z0-9]"
    ) {
        let kind = if ordered { BackendKind::Ordered } else { BackendKind::Memory };
        let dir = tempfile::tempdir().unwrap();
        let mut data = Data::open(&StoreConfig::new(dir.path(), kind)).unwrap();
        data.add_index("items", "initial", IndexKind::derived(|_, value| first_char(value)))
            .unwrap();
        let mut model = BTreeMap::new();

        for op in &ops {
            apply(&mut data, &mut model, op).unwrap();
        }

        let expected: Vec<Record> = model
            .iter()
            .filter(|(_, value)| first_char(value).as_deref() == Some(selector.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut index = data.index("items", "initial", &selector).unwrap();
        prop_assert_eq!(index.count().unwrap(), expected.len() as u64);
        let hits: Vec<Record> = index.records().collect::<DataResult<_>>().unwrap();
        prop_assert_eq!(hits, expected);

        // Records with an empty value derive no key and stay out of the index.
        let indexed = model.values().filter(|value| !value.is_empty()).count() as u64;
        prop_assert_eq!(data.table("items").unwrap().count_index("initial").unwrap(), indexed);
    }
}

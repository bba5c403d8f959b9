//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the engine's round-trip, namespacing and
//! notification guarantees over generated inputs.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    codec, CacheEngine, EngineParts, Entry, GetOptions, KeyNamespace, ManualClock, PutOptions,
};
use crate::config::{CacheConfig, CacheFlags};
use crate::storage::MemoryBackend;

const START: u64 = 1_700_000_000_000;

// == Strategies ==
/// Generates valid cache keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.]{1,32}"
}

/// Generates JSON values of a few shapes
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-zA-Z0-9 ]{0,64}".prop_map(|s| json!(s)),
        prop::collection::vec(any::<i32>(), 0..8).prop_map(|v| json!(v)),
        ("[a-z]{1,8}", any::<u32>()).prop_map(|(k, v)| {
            let mut object = serde_json::Map::new();
            object.insert(k, json!(v));
            Value::Object(object)
        }),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, value: Value },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        ("[a-c]", value_strategy()).prop_map(|(key, value)| CacheOp::Put { key, value }),
        "[a-c]".prop_map(|key| CacheOp::Remove { key }),
    ]
}

fn engine_on(backend: &MemoryBackend, clock: &ManualClock, prefix: &str) -> CacheEngine {
    let parts = EngineParts::new(Arc::new(backend.clone())).with_clock(Arc::new(clock.clone()));
    CacheEngine::with_parts(CacheConfig::session(prefix), CacheFlags::default(), parts).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Storing a value with a positive TTL and reading it back before the TTL
    // elapses returns the same value, from the mirror and from a fresh engine.
    #[test]
    fn prop_roundtrip_before_expiry(
        key in valid_key_strategy(),
        value in value_strategy(),
        ttl in 1u64..1_000,
        elapsed_fraction in 0u64..100,
    ) {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let mut engine = engine_on(&backend, &clock, "rt");

        engine.put_value(&key, value.clone(), PutOptions::ttl(ttl)).unwrap();
        clock.advance(Duration::from_millis(ttl * 60_000 * elapsed_fraction / 100));

        prop_assert_eq!(engine.get(&key, GetOptions::default()), Some(value.clone()));

        let mut fresh = engine_on(&backend, &clock, "rt");
        prop_assert_eq!(fresh.get(&key, GetOptions::default()), Some(value));
    }

    // decode(encode(e)) == e
    #[test]
    fn prop_codec_roundtrip(
        value in value_strategy(),
        created_at in 0u64..u64::MAX / 2,
        ttl in 0u64..10_000,
        encrypted in any::<bool>(),
    ) {
        let entry = Entry::new(value, created_at, ttl, encrypted);
        let decoded = codec::decode(&codec::encode(&entry).unwrap()).unwrap();
        prop_assert_eq!(decoded, entry);
    }

    // to_logical(to_physical(k)) == normalize(k)
    #[test]
    fn prop_namespace_bijection(
        prefix in "[a-z-]{1,12}",
        key in "\\PC{1,24}",
        case_sensitive in any::<bool>(),
    ) {
        let ns = KeyNamespace::new(&prefix, case_sensitive);
        let physical = ns.to_physical(&key).unwrap();
        prop_assert_eq!(ns.to_logical(&physical), Some(ns.normalize(&key).unwrap()));
    }

    // With case-insensitive keys, any casing of a key reaches the same entry.
    #[test]
    fn prop_case_insensitive_lookup(key in "[a-zA-Z]{1,16}", value in value_strategy()) {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let mut engine = engine_on(&backend, &clock, "case");

        engine.put_value(&key.to_uppercase(), value.clone(), PutOptions::default()).unwrap();
        prop_assert_eq!(engine.get(&key.to_lowercase(), GetOptions::default()), Some(value.clone()));

        let mut fresh = engine_on(&backend, &clock, "case");
        prop_assert_eq!(fresh.get(&key, GetOptions::default()), Some(value));
    }

    // Two prefixes over one backend never see each other's keys.
    #[test]
    fn prop_namespace_isolation(
        keys_a in prop::collection::hash_set(valid_key_strategy(), 1..10),
        keys_b in prop::collection::hash_set(valid_key_strategy(), 1..10),
    ) {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let mut a = engine_on(&backend, &clock, "alpha");
        let mut b = engine_on(&backend, &clock, "beta");

        for key in &keys_a {
            a.put(key, "from-a", PutOptions::default()).unwrap();
        }
        for key in &keys_b {
            b.put(key, "from-b", PutOptions::default()).unwrap();
        }

        let normalized_b: HashSet<String> = keys_b.iter().map(|k| k.to_lowercase()).collect();
        prop_assert_eq!(b.stats().total_items, normalized_b.len());

        prop_assert!(a.clear());
        prop_assert_eq!(a.stats().total_items, 0);
        prop_assert_eq!(b.stats().total_items, normalized_b.len());
        for key in &keys_b {
            prop_assert_eq!(b.get(key, GetOptions::default()), Some(json!("from-b")));
        }
    }

    // A key watcher sees the initial value, then each distinct value in order.
    #[test]
    fn prop_watch_order_collapses_duplicates(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let mut engine = engine_on(&backend, &clock, "w");
        let mut watcher = engine.watch("a").unwrap();

        let mut expected: Vec<Option<Value>> = vec![None];
        for op in ops {
            let next = match op {
                CacheOp::Put { key, value } => {
                    engine.put_value(&key, value.clone(), PutOptions::default()).unwrap();
                    (key == "a").then_some(Some(value))
                }
                CacheOp::Remove { key } => {
                    prop_assert!(engine.remove(&key));
                    (key == "a").then_some(None)
                }
            };
            if let Some(value) = next {
                if expected.last() != Some(&value) {
                    expected.push(value);
                }
            }
        }

        prop_assert_eq!(watcher.drain(), expected);
    }
}

use std::collections::HashMap;
use std::num::NonZeroUsize;

use chrono::{TimeZone, Utc};
use media_chooser_cache::{BoundedMediaCache, CacheItem, PurgePolicy};
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Payload(u32);

impl CacheItem for Payload {}

#[derive(Debug, Clone)]
enum Op {
    Add { key: u8, value: u32, secs: i64 },
    Get { key: u8 },
    Reverse,
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0u8..8, any::<u32>(), 0i64..1000).prop_map(|(key, value, secs)| Op::Add { key, value, secs }),
        3 => (0u8..8).prop_map(|key| Op::Get { key }),
        1 => Just(Op::Reverse),
        1 => Just(Op::Clear),
    ]
}

fn policy() -> impl Strategy<Value = PurgePolicy> {
    prop_oneof![Just(PurgePolicy::AddedDate), Just(PurgePolicy::LastAccessed)]
}

proptest! {
    #[test]
    fn test_capacity_and_latest_value_invariants(
        capacity in 1usize..6,
        policy in policy(),
        ops in prop::collection::vec(op(), 0..80),
    ) {
        let mut cache = BoundedMediaCache::new(NonZeroUsize::new(capacity).unwrap(), policy);
        let mut latest: HashMap<String, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Add { key, value, secs } => {
                    let key = format!("k{}", key);
                    cache.add_item(key.clone(), Payload(value), Utc.timestamp_opt(secs, 0).unwrap());
                    latest.insert(key.clone(), value);
                    // Invariant: the item just added is always resident
                    prop_assert_eq!(cache.peek(&key), Some(&Payload(value)));
                }
                Op::Get { key } => {
                    let key = format!("k{}", key);
                    // Invariant: a hit always returns the latest value for that key
                    if let Some(found) = cache.get(&key) {
                        prop_assert_eq!(Some(&found.0), latest.get(&key));
                    }
                }
                Op::Reverse => cache.reverse_purge_sorting(),
                Op::Clear => {
                    cache.clear();
                    prop_assert!(cache.is_empty());
                }
            }

            // Invariant: never more than capacity entries
            prop_assert!(cache.len() <= capacity);
            // Invariant: keys are unique
            let mut keys: Vec<&str> = cache.keys().collect();
            let total = keys.len();
            keys.sort_unstable();
            keys.dedup();
            prop_assert_eq!(keys.len(), total);
        }
    }

    #[test]
    fn test_double_reverse_is_identity(
        capacity in 1usize..6,
        policy in policy(),
        adds in prop::collection::vec((0u8..8, 0i64..1000), 1..20),
    ) {
        let mut cache = BoundedMediaCache::new(NonZeroUsize::new(capacity).unwrap(), policy);
        for (key, secs) in adds {
            cache.add_item(format!("k{}", key), Payload(0), Utc.timestamp_opt(secs, 0).unwrap());
        }

        let before = cache.purge_candidate().map(str::to_owned);
        cache.reverse_purge_sorting();
        cache.reverse_purge_sorting();
        prop_assert_eq!(cache.purge_candidate().map(str::to_owned), before);
        prop_assert!(!cache.purge_reversed());
    }
}

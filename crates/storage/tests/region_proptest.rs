//! Property-based tests for partitioned regions.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tessera_core::{QueryRegion, Value};
use tessera_storage::{bucket_for_key, PartitionedRegion};

proptest! {
    /// Property: every key routes to a valid bucket, and that bucket is the one
    /// holding the entry.
    #[test]
    fn keys_live_in_their_routed_bucket(
        keys in prop::collection::vec(-500i64..500, 0..100),
        buckets in 1usize..16,
    ) {
        let region = PartitionedRegion::new("trades", buckets).unwrap();
        for key in &keys {
            region.put(*key, Value::Long(key * 2)).unwrap();
        }
        for key in &keys {
            let key = Value::Long(*key);
            let bucket = bucket_for_key(&key, buckets);
            prop_assert!(bucket < buckets);
            prop_assert_eq!(region.bucket_of(&key), bucket);
            let local = region.bucket(bucket).unwrap();
            prop_assert!(local.get_entry(&key).is_some());
        }
    }

    /// Property: the buckets partition the region: their entries are disjoint
    /// and together equal the region's entries.
    #[test]
    fn buckets_partition_the_region(
        keys in prop::collection::btree_set(0i64..1000, 0..100),
        buckets in 1usize..16,
    ) {
        let region = PartitionedRegion::new("trades", buckets).unwrap();
        for key in &keys {
            region.put(*key, Value::Long(*key)).unwrap();
        }
        let mut seen = BTreeSet::new();
        let mut total = 0;
        for bucket in 0..buckets {
            let local = region.bucket(bucket).unwrap();
            for k in local.keys().unwrap() {
                total += 1;
                seen.insert(k.as_i64().unwrap());
            }
        }
        prop_assert_eq!(total, keys.len());
        prop_assert_eq!(&seen, &keys);
        prop_assert_eq!(region.size(), keys.len());
    }
}

//! Property-based tests for tessera-index using proptest.

use proptest::prelude::*;
use std::ops::Bound;
use tessera_core::{EntryRef, IndexHandle, IndexLookup, ObjectValue, RegionEntry, Value};
use tessera_index::{KeyExtractor, RangeIndex};

fn build(values: &[i64]) -> (RangeIndex, Vec<EntryRef>) {
    let index = RangeIndex::new("valIdx", "data", "val", KeyExtractor::path("val"));
    let entries: Vec<EntryRef> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let value = Value::object(ObjectValue::new("Data").with("val", v));
            RegionEntry::shared(Value::Int(i as i32), value, 1)
        })
        .collect();
    for e in &entries {
        index.insert(e);
    }
    (index, entries)
}

fn val(entry: &EntryRef) -> i64 {
    entry
        .value()
        .field("val")
        .and_then(Value::as_i64)
        .unwrap_or(i64::MIN)
}

fn numeric(v: i64, representation: u8) -> Value {
    match representation {
        0 => Value::Int(v as i32),
        1 => Value::Long(v),
        _ => Value::Double(v as f64),
    }
}

proptest! {
    /// Keys stored as Int, Long or Double are found by value whatever the
    /// representation of the bound.
    #[test]
    fn mixed_numeric_range_matches_scan(
        keys in prop::collection::vec((-20i64..20, 0u8..3), 0..100),
        bound in -25i64..25,
        representation in 0u8..3,
        inclusive: bool,
    ) {
        let index = RangeIndex::new("valIdx", "data", "val", KeyExtractor::path("val"));
        let mut expected = Vec::new();
        for (i, (v, r)) in keys.iter().enumerate() {
            let key = numeric(*v, *r);
            let value = Value::object(ObjectValue::new("Data").with("val", key));
            index.insert(&RegionEntry::shared(Value::Int(i as i32), value, 1));
            if *v > bound || (inclusive && *v == bound) {
                expected.push(i as i32);
            }
        }
        let lookup = IndexLookup::greater(numeric(bound, representation), inclusive);

        let view = index.acquire_read_lock_for_query();
        let mut hits: Vec<i32> = view
            .lookup(&lookup, false, None)
            .unwrap()
            .iter()
            .filter_map(|e| match e.key() {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        hits.sort();
        prop_assert_eq!(hits, expected);
    }

    /// A range lookup returns exactly the entries a scan would accept.
    #[test]
    fn range_matches_scan(
        values in prop::collection::vec(-50i64..50, 0..200),
        lo in -60i64..60,
        hi in -60i64..60,
        lo_inclusive: bool,
        hi_inclusive: bool,
    ) {
        let (index, entries) = build(&values);
        let lower = if lo_inclusive { Bound::Included(Value::Long(lo)) } else { Bound::Excluded(Value::Long(lo)) };
        let upper = if hi_inclusive { Bound::Included(Value::Long(hi)) } else { Bound::Excluded(Value::Long(hi)) };
        let lookup = IndexLookup::Range { lower, upper };

        let view = index.acquire_read_lock_for_query();
        let mut hits: Vec<i64> = view.lookup(&lookup, false, None).unwrap().iter().map(val).collect();
        let mut expected: Vec<i64> = entries
            .iter()
            .map(val)
            .filter(|v| lookup.matches(&Value::Long(*v)))
            .collect();
        prop_assert!(hits.windows(2).all(|w| w[0] <= w[1]), "results must be in key order");
        hits.sort();
        expected.sort();
        prop_assert_eq!(hits, expected);
    }

    /// Descending lookups return the ascending result reversed by key.
    #[test]
    fn descending_reverses_keys(values in prop::collection::vec(0i64..100, 0..100)) {
        let (index, _) = build(&values);
        let view = index.acquire_read_lock_for_query();
        let asc: Vec<i64> = view.lookup(&IndexLookup::All, false, None).unwrap().iter().map(val).collect();
        let mut desc: Vec<i64> = view.lookup(&IndexLookup::All, true, None).unwrap().iter().map(val).collect();
        desc.reverse();
        prop_assert_eq!(asc, desc);
    }

    /// A limit truncates without reordering.
    #[test]
    fn limit_is_prefix(values in prop::collection::vec(0i64..100, 0..100), limit in 0usize..20) {
        let (index, _) = build(&values);
        let view = index.acquire_read_lock_for_query();
        let all: Vec<i64> = view.lookup(&IndexLookup::All, false, None).unwrap().iter().map(val).collect();
        let limited: Vec<i64> = view.lookup(&IndexLookup::All, false, Some(limit)).unwrap().iter().map(val).collect();
        prop_assert_eq!(&all[..limit.min(all.len())], &limited[..]);
    }

    /// Removing entries keeps the count consistent.
    #[test]
    fn remove_keeps_count(
        values in prop::collection::vec(0i64..20, 1..100),
        removals in prop::collection::vec(0usize..100, 0..30),
    ) {
        let (index, entries) = build(&values);
        let mut removed = std::collections::HashSet::new();
        for r in removals {
            let i = r % entries.len();
            let was_indexed = index.remove(&entries[i]);
            prop_assert_eq!(was_indexed, removed.insert(i));
        }
        prop_assert_eq!(index.len(), entries.len() - removed.len());
    }
}

//! Storage boundary contracts.
//!
//! The query engine never sees region internals. It reads regions through
//! `QueryRegion` and searches indexes through `IndexHandle`; taking an index read-lock
//! yields an `IndexView` whose drop releases the lock.

use crate::entry::EntryRef;
use crate::error::Result;
use crate::value::Value;
use core::cmp::Ordering;
use core::fmt;
use core::ops::Bound;
use std::sync::Arc;

/// Identifier of one bucket (shard) of a partitioned region.
pub type BucketId = usize;

/// Shared handle to a region.
pub type RegionRef = Arc<dyn QueryRegion>;

/// Shared handle to an index.
pub type IndexRef = Arc<dyn IndexHandle>;

/// Partitioning metadata of a partitioned region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Total number of buckets.
    pub bucket_count: usize,
    /// Name of the region this one is co-located with, if any.
    pub colocated_with: Option<String>,
}

/// A named collection the query engine can iterate and search.
///
/// Every sequence returned here is a snapshot of live data taken at call time.
pub trait QueryRegion: Send + Sync + fmt::Debug {
    /// Returns the region name (without the leading `/`).
    fn name(&self) -> &str;

    /// Returns the value stored under a key.
    fn get(&self, key: &Value) -> Option<Value> {
        self.get_entry(key).map(|e| e.value().clone())
    }

    /// Returns the live entry stored under a key.
    fn get_entry(&self, key: &Value) -> Option<EntryRef>;

    /// Returns all live entries. Fails once the region is destroyed.
    fn entries(&self) -> Result<Vec<EntryRef>>;

    /// Returns all keys.
    fn keys(&self) -> Result<Vec<Value>> {
        Ok(self.entries()?.iter().map(|e| e.key().clone()).collect())
    }

    /// Returns all values.
    fn values(&self) -> Result<Vec<Value>> {
        Ok(self.entries()?.iter().map(|e| e.value().clone()).collect())
    }

    /// Returns the number of live entries.
    fn size(&self) -> usize;

    /// Returns true once the region has been destroyed or closed.
    fn is_destroyed(&self) -> bool;

    /// Returns the indexes defined on this region.
    fn indexes(&self) -> Vec<IndexRef>;

    /// Returns partitioning metadata for partitioned regions.
    fn partition(&self) -> Option<PartitionInfo> {
        None
    }

    /// Returns the bucket-local view of a partitioned region.
    fn bucket(&self, bucket: BucketId) -> Option<RegionRef> {
        let _ = bucket;
        None
    }
}

/// An index handle exposed by a region.
pub trait IndexHandle: Send + Sync + fmt::Debug {
    /// Returns the index name.
    fn name(&self) -> &str;

    /// Returns the name of the region the index belongs to.
    fn region_name(&self) -> &str;

    /// Returns the canonical indexed expression, relative to a region value
    /// (for example `ID` or `status.name`).
    fn indexed_expression(&self) -> &str;

    /// Takes a read-lock for the duration of a query. Dropping the view releases it.
    fn acquire_read_lock_for_query(&self) -> Box<dyn IndexView>;
}

/// A read-locked view of an index.
pub trait IndexView: Send {
    /// Returns the index name.
    fn index_name(&self) -> &str;

    /// Returns matching entries in index-key order (reversed when `descending`),
    /// stopping after `limit` entries.
    ///
    /// A range whose bound cannot be ordered against an indexed non-null key
    /// fails with `Error::TypeMismatch`.
    fn lookup(
        &self,
        lookup: &IndexLookup,
        descending: bool,
        limit: Option<usize>,
    ) -> Result<Vec<EntryRef>>;

    /// Returns the number of indexed entries.
    fn size(&self) -> usize;
}

/// A lookup against an index.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexLookup {
    /// Every indexed entry.
    All,
    /// Keys equal to a value.
    Equal(Value),
    /// Keys within bounds. Only keys comparable with the bounds fall in a range,
    /// so null keys never do.
    Range {
        lower: Bound<Value>,
        upper: Bound<Value>,
    },
    /// Keys equal to any of the values.
    In(Vec<Value>),
}

impl IndexLookup {
    /// Keys greater than (or equal to) a value.
    pub fn greater(value: Value, inclusive: bool) -> Self {
        let lower = if inclusive {
            Bound::Included(value)
        } else {
            Bound::Excluded(value)
        };
        IndexLookup::Range {
            lower,
            upper: Bound::Unbounded,
        }
    }

    /// Keys less than (or equal to) a value.
    pub fn less(value: Value, inclusive: bool) -> Self {
        let upper = if inclusive {
            Bound::Included(value)
        } else {
            Bound::Excluded(value)
        };
        IndexLookup::Range {
            lower: Bound::Unbounded,
            upper,
        }
    }

    /// Returns true if a key satisfies this lookup.
    pub fn matches(&self, key: &Value) -> bool {
        match self {
            IndexLookup::All => true,
            IndexLookup::Equal(v) => key.compare_widening(v) == Ordering::Equal,
            IndexLookup::In(values) => values
                .iter()
                .any(|v| key.compare_widening(v) == Ordering::Equal),
            IndexLookup::Range { lower, upper } => {
                let comparable = |b: &Bound<Value>| match b {
                    Bound::Included(v) | Bound::Excluded(v) => key.is_comparable_with(v),
                    Bound::Unbounded => !key.is_null() && !key.is_undefined(),
                };
                if !comparable(lower) || !comparable(upper) {
                    return false;
                }
                let lower_ok = match lower {
                    Bound::Included(v) => key.compare_widening(v).is_ge(),
                    Bound::Excluded(v) => key.compare_widening(v).is_gt(),
                    Bound::Unbounded => true,
                };
                let upper_ok = match upper {
                    Bound::Included(v) => key.compare_widening(v).is_le(),
                    Bound::Excluded(v) => key.compare_widening(v).is_lt(),
                    Bound::Unbounded => true,
                };
                lower_ok && upper_ok
            }
        }
    }

    /// Combines two lookups on the same index into one that matches their
    /// intersection. Returns None when the combination cannot be expressed as a
    /// single lookup.
    pub fn intersect(&self, other: &IndexLookup) -> Option<IndexLookup> {
        match (self, other) {
            (IndexLookup::All, o) | (o, IndexLookup::All) => Some(o.clone()),
            (IndexLookup::Equal(v), o) | (o, IndexLookup::Equal(v)) => {
                if o.matches(v) {
                    Some(IndexLookup::Equal(v.clone()))
                } else {
                    Some(IndexLookup::In(Vec::new()))
                }
            }
            (IndexLookup::In(values), o) | (o, IndexLookup::In(values)) => Some(IndexLookup::In(
                values.iter().filter(|v| o.matches(v)).cloned().collect(),
            )),
            (
                IndexLookup::Range {
                    lower: l1,
                    upper: u1,
                },
                IndexLookup::Range {
                    lower: l2,
                    upper: u2,
                },
            ) => Some(IndexLookup::Range {
                lower: tighter_lower(l1, l2),
                upper: tighter_upper(u1, u2),
            }),
        }
    }
}

fn tighter_lower(a: &Bound<Value>, b: &Bound<Value>) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x.clone(),
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(widest(x, y, true).clone()),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(widest(x, y, true).clone()),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i.compare_widening(e).is_gt() {
                Bound::Included(i.clone())
            } else {
                Bound::Excluded(e.clone())
            }
        }
    }
}

/// Picks the larger (or smaller) of two bound values by numeric-widening order.
fn widest<'v>(x: &'v Value, y: &'v Value, larger: bool) -> &'v Value {
    let ord = x.compare_widening(y);
    if (larger && ord.is_lt()) || (!larger && ord.is_gt()) {
        y
    } else {
        x
    }
}

fn tighter_upper(a: &Bound<Value>, b: &Bound<Value>) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x.clone(),
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(widest(x, y, false).clone()),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(widest(x, y, false).clone()),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i.compare_widening(e).is_lt() {
                Bound::Included(i.clone())
            } else {
                Bound::Excluded(e.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_matches() {
        let range = IndexLookup::Range {
            lower: Bound::Excluded(Value::Int(4)),
            upper: Bound::Excluded(Value::Int(9)),
        };
        assert!(!range.matches(&Value::Int(4)));
        assert!(range.matches(&Value::Int(5)));
        assert!(range.matches(&Value::Long(8)));
        assert!(!range.matches(&Value::Int(9)));
        assert!(!IndexLookup::less(Value::Int(9), false).matches(&Value::Null));
        assert!(!IndexLookup::greater(Value::Int(9), false).matches(&Value::from("z")));
    }

    #[test]
    fn test_equal_and_in() {
        assert!(IndexLookup::Equal(Value::Null).matches(&Value::Null));
        let lookup = IndexLookup::In(vec![Value::Int(1), Value::Int(3)]);
        assert!(lookup.matches(&Value::Long(3)));
        assert!(!lookup.matches(&Value::Int(2)));
    }

    #[test]
    fn test_intersect_ranges() {
        let gt = IndexLookup::greater(Value::Int(4), false);
        let lt = IndexLookup::less(Value::Int(9), false);
        let merged = gt.intersect(&lt).unwrap();
        assert_eq!(
            merged,
            IndexLookup::Range {
                lower: Bound::Excluded(Value::Int(4)),
                upper: Bound::Excluded(Value::Int(9)),
            }
        );

        let ge = IndexLookup::greater(Value::Int(6), true);
        let tighter = merged.intersect(&ge).unwrap();
        assert!(!tighter.matches(&Value::Int(5)));
        assert!(tighter.matches(&Value::Int(6)));
    }

    #[test]
    fn test_intersect_equal() {
        let eq = IndexLookup::Equal(Value::Int(5));
        let gt = IndexLookup::greater(Value::Int(4), false);
        assert_eq!(eq.intersect(&gt), Some(IndexLookup::Equal(Value::Int(5))));

        let lt = IndexLookup::less(Value::Int(5), false);
        assert_eq!(eq.intersect(&lt), Some(IndexLookup::In(Vec::new())));
    }

    #[test]
    fn test_intersect_mixed_numeric_bounds() {
        let ge = IndexLookup::greater(Value::Long(4), true);
        let gt = IndexLookup::greater(Value::Int(4), false);
        let merged = ge.intersect(&gt).unwrap();
        assert!(!merged.matches(&Value::Int(4)));
        assert!(merged.matches(&Value::Double(4.5)));

        let le = IndexLookup::less(Value::Double(7.0), true);
        let lt = IndexLookup::less(Value::Int(7), false);
        let merged = lt.intersect(&le).unwrap();
        assert!(!merged.matches(&Value::Long(7)));
        assert!(merged.matches(&Value::Int(6)));
    }
}

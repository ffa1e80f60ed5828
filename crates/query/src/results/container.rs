//! Container selection and row collection.

use super::{QueryResults, ResultCollector};
use core::cmp::Ordering;
use core::fmt;
use hashbrown::HashSet;
use indexmap::IndexSet;
use std::sync::Arc;
use tessera_core::{StructType, Value};

/// Compares ORDER BY key vectors, one direction per key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowComparator {
    descending: Vec<bool>,
}

impl RowComparator {
    pub fn new(descending: Vec<bool>) -> Self {
        Self { descending }
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.descending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descending.is_empty()
    }

    /// Compares two key vectors lexicographically.
    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            let ord = x.cmp(y);
            let ord = if self.descending.get(i).copied().unwrap_or(false) {
                ord.reverse()
            } else {
                ord
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// How a SELECT's rows are collected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub ordered: bool,
    pub distinct: bool,
    pub is_struct: bool,
    /// Rows already arrive in ORDER BY order, so no sorting is needed.
    pub ignore_order_by: bool,
    pub count: bool,
    pub limit: Option<usize>,
    /// ORDER BY directions.
    pub comparator: RowComparator,
}

/// The container family chosen for a spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    UnorderedSet,
    UnorderedBag,
    SortedSet,
    SortedBag,
    /// Distinct rows kept in arrival order.
    LinkedSet,
    /// Rows kept in arrival order.
    LinkedBag,
    Count,
}

impl ContainerSpec {
    pub fn kind(&self) -> ContainerKind {
        match (self.count, self.ordered && !self.ignore_order_by, self.ordered, self.distinct) {
            (true, ..) => ContainerKind::Count,
            (false, true, _, true) => ContainerKind::SortedSet,
            (false, true, _, false) => ContainerKind::SortedBag,
            (false, false, true, true) => ContainerKind::LinkedSet,
            (false, false, true, false) => ContainerKind::LinkedBag,
            (false, false, false, true) => ContainerKind::UnorderedSet,
            (false, false, false, false) => ContainerKind::UnorderedBag,
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerKind::UnorderedSet => "unordered set",
            ContainerKind::UnorderedBag => "unordered bag",
            ContainerKind::SortedSet => "sorted set",
            ContainerKind::SortedBag => "sorted bag",
            ContainerKind::LinkedSet => "linked set",
            ContainerKind::LinkedBag => "linked bag",
            ContainerKind::Count => "count",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct KeyedRow {
    row: Value,
    key: Vec<Value>,
}

#[derive(Debug)]
enum Rows {
    Set(IndexSet<Value>),
    Bag(Vec<Value>),
    Sorted {
        rows: Vec<KeyedRow>,
        /// Rows held, tracked only for DISTINCT.
        seen: HashSet<Value>,
    },
    Count {
        count: usize,
        distinct: Option<IndexSet<Value>>,
    },
}

/// Collects rows for one SELECT evaluation.
#[derive(Debug)]
pub struct ResultContainer {
    spec: ContainerSpec,
    struct_type: Option<Arc<StructType>>,
    rows: Rows,
}

impl ResultContainer {
    pub fn new(spec: ContainerSpec, struct_type: Option<Arc<StructType>>) -> Self {
        let rows = match spec.kind() {
            ContainerKind::UnorderedSet | ContainerKind::LinkedSet => Rows::Set(IndexSet::new()),
            ContainerKind::UnorderedBag | ContainerKind::LinkedBag => Rows::Bag(Vec::new()),
            ContainerKind::SortedSet | ContainerKind::SortedBag => Rows::Sorted {
                rows: Vec::new(),
                seen: HashSet::new(),
            },
            ContainerKind::Count => Rows::Count {
                count: 0,
                distinct: spec.distinct.then(IndexSet::new),
            },
        };
        Self {
            spec,
            struct_type,
            rows,
        }
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn kind(&self) -> ContainerKind {
        self.spec.kind()
    }

    fn at_limit(&self) -> bool {
        self.spec.limit.map_or(false, |limit| self.len() >= limit)
    }

    /// Finishes collection. When `keep_keys` is set, sorted rows keep their key
    /// values so partial results can be merged.
    pub fn finish(self, keep_keys: bool) -> QueryResults {
        let kind = self.spec.kind();
        let ordered = self.spec.ordered;
        let results = match self.rows {
            Rows::Set(rows) => {
                QueryResults::new(kind, ordered, self.struct_type, rows.into_iter().collect(), None)
            }
            Rows::Bag(rows) => QueryResults::new(kind, ordered, self.struct_type, rows, None),
            Rows::Sorted { rows, .. } => {
                let (rows, keys): (Vec<Value>, Vec<Vec<Value>>) =
                    rows.into_iter().map(|r| (r.row, r.key)).unzip();
                let keys = keep_keys.then_some(keys);
                QueryResults::new(kind, ordered, self.struct_type, rows, keys)
            }
            Rows::Count { count, distinct } => {
                let count = distinct.map_or(count, |d| d.len());
                let count = self.spec.limit.map_or(count, |l| count.min(l));
                return QueryResults::count(count);
            }
        };
        results.with_comparator(ordered.then_some(self.spec.comparator))
    }
}

impl ResultCollector for ResultContainer {
    fn add(&mut self, row: Value, sort_key: Vec<Value>) -> bool {
        let limit = self.spec.limit;
        if limit == Some(0) {
            return false;
        }
        let full = self.at_limit();
        match &mut self.rows {
            Rows::Set(rows) => {
                if full || rows.contains(&row) {
                    return false;
                }
                rows.insert(row)
            }
            Rows::Bag(rows) => {
                if full {
                    return false;
                }
                rows.push(row);
                true
            }
            Rows::Sorted { rows, seen } => {
                let distinct = self.spec.distinct;
                if distinct && seen.contains(&row) {
                    return false;
                }
                let comparator = &self.spec.comparator;
                let at = rows.partition_point(|r| comparator.compare(&r.key, &sort_key) != Ordering::Greater);
                if limit.map_or(false, |l| at >= l) {
                    return false;
                }
                if distinct {
                    seen.insert(row.clone());
                }
                rows.insert(at, KeyedRow { row, key: sort_key });
                if limit.map_or(false, |l| rows.len() > l) {
                    if let Some(evicted) = rows.pop() {
                        seen.remove(&evicted.row);
                    }
                }
                true
            }
            Rows::Count { count, distinct } => match distinct {
                Some(seen) => seen.insert(row),
                None => {
                    *count += 1;
                    true
                }
            },
        }
    }

    fn add_count(&mut self, n: usize) {
        if let Rows::Count { count, .. } = &mut self.rows {
            *count += n;
        }
    }

    fn len(&self) -> usize {
        match &self.rows {
            Rows::Set(rows) => rows.len(),
            Rows::Bag(rows) => rows.len(),
            Rows::Sorted { rows, .. } => rows.len(),
            Rows::Count { count, distinct } => distinct.as_ref().map_or(*count, |d| d.len()),
        }
    }

    fn is_full(&self) -> bool {
        match self.spec.kind() {
            ContainerKind::SortedSet | ContainerKind::SortedBag => self.spec.limit == Some(0),
            _ => self.at_limit(),
        }
    }
}

//! Materialized query results.

use super::{ContainerKind, Distinctness, RowComparator, RowOrdering, TupleShape};
use hashbrown::HashSet;
use indexmap::IndexSet;
use std::sync::Arc;
use tessera_core::{ObjectType, StructType, Value};

/// The rows returned by a query.
#[derive(Clone, Debug)]
pub struct QueryResults {
    kind: ContainerKind,
    ordered: bool,
    struct_type: Option<Arc<StructType>>,
    rows: Vec<Value>,
    /// ORDER BY key values per row, kept for bucket results that are merged later.
    sort_keys: Option<Vec<Vec<Value>>>,
    /// ORDER BY directions of an ordered result.
    comparator: Option<RowComparator>,
    count: Option<usize>,
}

impl QueryResults {
    pub(crate) fn new(
        kind: ContainerKind,
        ordered: bool,
        struct_type: Option<Arc<StructType>>,
        rows: Vec<Value>,
        sort_keys: Option<Vec<Vec<Value>>>,
    ) -> Self {
        Self {
            kind,
            ordered,
            struct_type,
            rows,
            sort_keys,
            comparator: None,
            count: None,
        }
    }

    pub(crate) fn with_comparator(mut self, comparator: Option<RowComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub(crate) fn count(count: usize) -> Self {
        Self {
            kind: ContainerKind::Count,
            ordered: false,
            struct_type: None,
            rows: vec![Value::count(count)],
            sort_keys: None,
            comparator: None,
            count: Some(count),
        }
    }

    /// Wraps the value of a non-SELECT query.
    pub(crate) fn single(value: Value) -> Self {
        Self::new(ContainerKind::UnorderedBag, false, None, vec![value], None)
    }

    /// Returns the container family that produced the rows.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Returns the COUNT(*) value of a count query.
    pub fn count_value(&self) -> Option<usize> {
        self.count
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.rows.iter()
    }

    /// Returns the rows in result order.
    pub fn as_list(&self) -> &[Value] {
        &self.rows
    }

    /// Returns the distinct rows, in result order.
    pub fn as_set(&self) -> IndexSet<Value> {
        self.rows.iter().cloned().collect()
    }

    pub fn into_rows(self) -> Vec<Value> {
        self.rows
    }

    /// Returns the rows as a collection value (the value of a sub-query).
    pub(crate) fn into_value(self) -> Value {
        Value::collection(self.rows)
    }

    /// Returns rows paired with their ORDER BY keys, if they were kept.
    pub(crate) fn into_keyed(self) -> Vec<(Value, Vec<Value>)> {
        match self.sort_keys {
            Some(keys) => self.rows.into_iter().zip(keys).collect(),
            None => self.rows.into_iter().map(|r| (r, Vec::new())).collect(),
        }
    }
}

impl Distinctness for QueryResults {
    fn is_distinct(&self) -> bool {
        matches!(
            self.kind,
            ContainerKind::UnorderedSet | ContainerKind::SortedSet | ContainerKind::LinkedSet
        )
    }

    fn occurrences(&self, row: &Value) -> usize {
        self.rows.iter().filter(|r| *r == row).count()
    }
}

impl RowOrdering for QueryResults {
    fn is_ordered(&self) -> bool {
        self.ordered
    }

    fn comparator(&self) -> Option<&RowComparator> {
        self.comparator.as_ref()
    }
}

impl TupleShape for QueryResults {
    fn struct_type(&self) -> Option<&Arc<StructType>> {
        self.struct_type.as_ref()
    }

    fn element_type(&self) -> ObjectType {
        if self.count.is_some() {
            return ObjectType::Int;
        }
        if self.struct_type.is_some() {
            return ObjectType::Struct;
        }
        let types: HashSet<ObjectType> = self
            .rows
            .iter()
            .filter(|r| !r.is_null() && !r.is_undefined())
            .map(Value::data_type)
            .collect();
        match types.len() {
            1 => types.into_iter().next().unwrap_or(ObjectType::Any),
            _ => ObjectType::Any,
        }
    }
}

impl<'a> IntoIterator for &'a QueryResults {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for QueryResults {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

//! Result containers.
//!
//! The container a SELECT collects into is chosen from its shape: ordered or
//! not, distinct or not, struct rows or scalar rows, and whether an index
//! already delivers rows in ORDER BY order. Behaviour is expressed through the
//! capability traits below rather than through a class per combination.

mod container;
mod typed;

pub use container::{ContainerKind, ContainerSpec, ResultContainer, RowComparator};
pub use typed::QueryResults;

use std::sync::Arc;
use tessera_core::{ObjectType, StructType, Value};

/// Duplicate handling.
pub trait Distinctness {
    /// Returns true if duplicate rows are collapsed.
    fn is_distinct(&self) -> bool;

    /// Returns how many times an equal row occurs.
    fn occurrences(&self, row: &Value) -> usize;
}

/// Row ordering.
pub trait RowOrdering {
    /// Returns true if rows are kept in ORDER BY order.
    fn is_ordered(&self) -> bool;

    /// Returns the comparator applied to sort keys, when ordered.
    fn comparator(&self) -> Option<&RowComparator>;
}

/// Row shape.
pub trait TupleShape {
    /// Returns the struct type of multi-column rows.
    fn struct_type(&self) -> Option<&Arc<StructType>>;

    /// Returns the element type of the rows.
    fn element_type(&self) -> ObjectType;
}

/// Sink for rows produced by the iteration loop.
pub trait ResultCollector {
    /// Adds a row with its ORDER BY key values. Returns false if the row was
    /// rejected (a duplicate, or past the limit).
    fn add(&mut self, row: Value, sort_key: Vec<Value>) -> bool;

    /// Adds `n` to a COUNT(*) result.
    fn add_count(&mut self, n: usize);

    /// Returns the number of rows held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once further rows cannot change the result.
    fn is_full(&self) -> bool;
}

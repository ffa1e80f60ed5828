//! Tessera Index - range indexes over region values.
//!
//! A `RangeIndex` maps an indexed key (derived from each entry value by a
//! `KeyExtractor`) to the entries carrying it. It answers equality, range and
//! IN lookups in key order and hands out read-locked views to queries.
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{IndexHandle, IndexLookup, ObjectValue, RegionEntry, Value};
//! use tessera_index::{KeyExtractor, RangeIndex};
//!
//! let index = RangeIndex::new("idIdx", "portfolios", "ID", KeyExtractor::path("ID"));
//! for id in 0..10 {
//!     let value = Value::object(ObjectValue::new("Portfolio").with("ID", id));
//!     index.insert(&RegionEntry::shared(Value::Int(id), value, 1));
//! }
//!
//! let view = index.acquire_read_lock_for_query();
//! let hits = view.lookup(&IndexLookup::greater(Value::Int(6), false), false, None).unwrap();
//! assert_eq!(hits.len(), 3);
//! ```

mod extractor;
mod range;
mod stats;

pub use extractor::KeyExtractor;
pub use range::{RangeIndex, RangeIndexView};
pub use stats::IndexStats;

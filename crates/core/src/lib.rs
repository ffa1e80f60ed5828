//! Tessera Core - object model and boundary contracts for the Tessera query engine.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - `Value`: runtime values navigated by queries (scalars, objects, structs,
//!   collections, region entries and region handles)
//! - `ObjectType` / `StructType`: runtime type descriptors for values and result rows
//! - `QueryRegion` / `IndexHandle` / `IndexView`: the narrow contracts through which the
//!   query engine reads storage and searches indexes
//! - `Error`: error type for storage and index operations
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{ObjectValue, Value};
//!
//! let portfolio = Value::object(
//!     ObjectValue::new("Portfolio")
//!         .with("ID", 1)
//!         .with("status", "active"),
//! );
//!
//! assert_eq!(portfolio.field("status"), Some(&Value::from("active")));
//! assert_eq!(portfolio.field("missing"), None);
//! ```

mod entry;
mod error;
pub mod pattern_match;
mod region;
mod types;
mod value;

pub use entry::{EntryRef, RegionEntry};
pub use error::{Error, Result};
pub use region::{
    BucketId, IndexHandle, IndexLookup, IndexRef, IndexView, PartitionInfo, QueryRegion,
    RegionRef,
};
pub use types::{ObjectType, StructType};
pub use value::{ObjectValue, StructValue, Value};

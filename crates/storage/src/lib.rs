//! Tessera Storage - in-memory regions queried by the Tessera engine.
//!
//! This crate provides:
//!
//! - `LocalRegion`: a key/value region with entry lifecycle and index maintenance
//! - `PartitionedRegion`: a region split into a fixed number of buckets, each a
//!   `LocalRegion`, with FNV-1a key routing and colocation metadata
//! - `RegionCache`: the named registry the query engine resolves `/name` against
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{ObjectValue, QueryRegion, Value};
//! use tessera_storage::RegionCache;
//!
//! let cache = RegionCache::new();
//! let portfolios = cache.create_region("portfolios").unwrap();
//! portfolios
//!     .put(1, Value::object(ObjectValue::new("Portfolio").with("ID", 1)))
//!     .unwrap();
//!
//! let region = cache.region("/portfolios").unwrap();
//! assert_eq!(region.size(), 1);
//! ```

mod cache;
mod local;
mod partitioned;
mod routing;

pub use cache::{RegionCache, RegionHandle};
pub use local::LocalRegion;
pub use partitioned::PartitionedRegion;
pub use routing::bucket_for_key;

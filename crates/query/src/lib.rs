//! Tessera Query - OQL query compilation and execution over region caches.
//!
//! This crate compiles object query text into an immutable node tree and runs
//! it against the regions of a `RegionCache`:
//!
//! - `parser`: query text to an untransformed compiled tree
//! - `optimizer`: compile-time passes (GROUP BY rewrite, ORDER BY mapping, LIMIT eligibility)
//! - `executor`: name resolution, evaluation, index planning and nested iteration
//! - `method`: type registry, method resolution and invocation authorization
//! - `results`: result containers and `QueryResults`
//! - `distributed`: per-bucket evaluation of queries over partitioned regions
//! - `service`: `QueryService` and `Query`, the public entry points
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::{ObjectValue, Value};
//! use tessera_query::QueryService;
//! use tessera_storage::RegionCache;
//!
//! let cache = Arc::new(RegionCache::new());
//! let portfolios = cache.create_region("portfolios").unwrap();
//! portfolios
//!     .put(1, ObjectValue::new("Portfolio").with("ID", 1).with("status", "active"))
//!     .unwrap();
//! portfolios
//!     .put(2, ObjectValue::new("Portfolio").with("ID", 2).with("status", "inactive"))
//!     .unwrap();
//!
//! let service = QueryService::new(cache);
//! let query = service
//!     .new_query("SELECT p.ID FROM /portfolios p WHERE p.status = $1")
//!     .unwrap();
//! let results = query.execute(&[Value::from("active")]).unwrap();
//! assert_eq!(results.as_list(), vec![Value::Int(1)]);
//! ```

pub mod ast;
pub mod config;
mod context;
pub mod distributed;
pub mod error;
mod executor;
pub mod method;
pub mod optimizer;
pub mod parser;
pub mod results;
pub mod service;

#[cfg(test)]
mod testing;

pub use ast::{CompiledQuery, CompiledValue, NodeId};
pub use config::QueryConfig;
pub use context::CancellationToken;
pub use distributed::FunctionContext;
pub use error::{MethodError, QueryError, Result};
pub use method::{
    AllowAllAuthorizer, ClassDescriptor, MethodAuthorizer, MethodDescriptor, RestrictedAuthorizer,
    TypeRegistry,
};
pub use results::{ContainerKind, QueryResults};
pub use service::{Query, QueryService};

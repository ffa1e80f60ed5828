//! Per-run execution state.
//!
//! A compiled query is immutable and shared; everything a single run needs
//! (name bindings, current iterator values, cached plans, authorization answers)
//! lives in an `ExecutionContext` keyed by `NodeId`.

use crate::ast::{CompiledQuery, NodeId};
use crate::config::QueryConfig;
use crate::error::{QueryError, Result};
use crate::executor::PlanInfo;
use crate::method::{MethodAuthorizer, TypeRegistry};
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{BucketId, RegionRef, Value};
use tessera_storage::RegionCache;

/// Cooperative cancellation flag, optionally with a deadline.
///
/// Clones share the flag. The engine polls it at every outer-loop step and
/// before every index lookup.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that also expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Err(QueryError::Cancelled("query was cancelled".into()));
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(QueryError::Cancelled("query exceeded its time limit".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Services a query run draws on.
#[derive(Clone, Debug)]
pub(crate) struct QueryEnv {
    pub(crate) cache: Arc<RegionCache>,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) authorizer: Arc<dyn MethodAuthorizer>,
    pub(crate) config: QueryConfig,
}

/// What a name or receiver-less call refers to, decided once per run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Binding {
    /// An iterator variable.
    Iterator(NodeId),
    /// A region, by name.
    Region(String),
    /// An attribute or method of the given iterator's current value.
    Implicit(NodeId),
}

/// Set of `IteratorDef` nodes an expression reads.
pub(crate) type Dependencies = HashSet<NodeId>;

/// Counters reported in the trace line.
#[derive(Clone, Debug, Default)]
pub(crate) struct RunStats {
    pub(crate) rows_examined: usize,
    pub(crate) indexes_used: Vec<String>,
}

pub(crate) struct ExecutionContext<'a> {
    pub(crate) query: &'a CompiledQuery,
    pub(crate) env: &'a QueryEnv,
    params: &'a [Value],
    cancel: CancellationToken,
    /// Bucket the run is confined to, for bucket-local sub-queries.
    pub(crate) bucket: Option<BucketId>,
    /// True when running on behalf of a data-aware function.
    pub(crate) in_function: bool,
    /// Iterators bound so far, per open scope, while resolving names.
    pub(crate) scopes: Vec<Vec<NodeId>>,
    pub(crate) bindings: HashMap<NodeId, Binding>,
    pub(crate) dependencies: HashMap<NodeId, Dependencies>,
    /// Current value of every iterator.
    pub(crate) current: HashMap<NodeId, Value>,
    regions: HashMap<String, RegionRef>,
    pub(crate) plans: HashMap<NodeId, Rc<PlanInfo>>,
    /// Results of uncorrelated sub-queries.
    pub(crate) subquery_results: HashMap<NodeId, Value>,
    pub(crate) authorized: HashMap<(String, String), bool>,
    pub(crate) stats: RunStats,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        query: &'a CompiledQuery,
        env: &'a QueryEnv,
        params: &'a [Value],
        cancel: CancellationToken,
    ) -> Self {
        Self {
            query,
            env,
            params,
            cancel,
            bucket: None,
            in_function: false,
            scopes: Vec::new(),
            bindings: HashMap::new(),
            dependencies: HashMap::new(),
            current: HashMap::new(),
            regions: HashMap::new(),
            plans: HashMap::new(),
            subquery_results: HashMap::new(),
            authorized: HashMap::new(),
            stats: RunStats::default(),
        }
    }

    /// Confines the run to one bucket of every partitioned region it reads.
    pub(crate) fn for_bucket(mut self, bucket: BucketId, in_function: bool) -> Self {
        self.bucket = Some(bucket);
        self.in_function = in_function;
        self
    }

    pub(crate) fn config(&self) -> &QueryConfig {
        &self.env.config
    }

    pub(crate) fn params(&self) -> &'a [Value] {
        self.params
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Returns bind argument `$position`.
    pub(crate) fn param(&self, position: usize) -> Result<Value> {
        position
            .checked_sub(1)
            .and_then(|i| self.params.get(i))
            .cloned()
            .ok_or_else(|| {
                QueryError::invalid_query(format!(
                    "bind argument ${} was not supplied ({} given)",
                    position,
                    self.params.len()
                ))
            })
    }

    /// Looks up a region, narrowed to the run's bucket when partitioned.
    pub(crate) fn region(&mut self, name: &str) -> Result<RegionRef> {
        let name = name.trim_start_matches('/');
        if let Some(region) = self.regions.get(name) {
            return Ok(region.clone());
        }
        let region = self
            .env
            .cache
            .region(name)
            .ok_or_else(|| QueryError::unresolved(format!("region /{} not found", name)))?;
        let region = match (self.bucket, region.partition()) {
            (Some(bucket), Some(_)) => region.bucket(bucket).ok_or_else(|| {
                QueryError::RegionUnavailable(format!(
                    "bucket {} of region /{} is not available",
                    bucket, name
                ))
            })?,
            _ => region,
        };
        if region.is_destroyed() {
            return Err(QueryError::RegionUnavailable(format!(
                "region /{} has been destroyed",
                name
            )));
        }
        self.regions.insert(name.to_owned(), region.clone());
        Ok(region)
    }

    /// Returns true if a region with this name exists.
    pub(crate) fn has_region(&self, name: &str) -> bool {
        self.env.cache.has_region(name.trim_start_matches('/'))
    }

    /// Returns the current value of an iterator.
    pub(crate) fn iterator_value(&self, def: NodeId) -> Value {
        self.current.get(&def).cloned().unwrap_or(Value::Undefined)
    }

    pub(crate) fn bind_iterator(&mut self, def: NodeId, value: Value) {
        self.current.insert(def, value);
    }

    /// Returns the iterators an expression depends on.
    pub(crate) fn dependencies_of(&self, id: NodeId) -> Option<&Dependencies> {
        self.dependencies.get(&id)
    }

    /// Returns true if `id` reads none of `iterators`.
    pub(crate) fn independent_of(&self, id: NodeId, iterators: &[NodeId]) -> bool {
        self.dependencies
            .get(&id)
            .map_or(true, |deps| iterators.iter().all(|it| !deps.contains(it)))
    }
}

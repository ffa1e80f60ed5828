//! Public entry points: `QueryService` compiles queries and defines indexes,
//! `Query` runs a compiled query.

use crate::ast::{CompiledQuery, CompiledValue, NodeId};
use crate::config::QueryConfig;
use crate::context::{CancellationToken, ExecutionContext, QueryEnv, RunStats};
use crate::distributed::{execute_partitioned, partitioned_target, FunctionContext};
use crate::error::{QueryError, Result};
use crate::method::{AllowAllAuthorizer, MethodAuthorizer, TypeRegistry};
use crate::optimizer;
use crate::parser::parse_index_definition;
use crate::results::QueryResults;
use std::sync::Arc;
use std::time::Instant;
use tessera_core::{BucketId, QueryRegion, Value};
use tessera_index::{KeyExtractor, RangeIndex};
use tessera_storage::RegionCache;
use tracing::{debug, info};

/// Query service over a region cache.
#[derive(Clone, Debug)]
pub struct QueryService {
    env: QueryEnv,
}

impl QueryService {
    /// Creates a service with the built-in type registry, no method
    /// restrictions and the default configuration.
    pub fn new(cache: Arc<RegionCache>) -> Self {
        Self {
            env: QueryEnv {
                cache,
                registry: Arc::new(TypeRegistry::new()),
                authorizer: Arc::new(AllowAllAuthorizer),
                config: QueryConfig::default(),
            },
        }
    }

    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.env.registry = Arc::new(registry);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn MethodAuthorizer>) -> Self {
        self.env.authorizer = authorizer;
        self
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.env.config = config;
        self
    }

    pub fn cache(&self) -> &Arc<RegionCache> {
        &self.env.cache
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.env.registry
    }

    pub fn config(&self) -> &QueryConfig {
        &self.env.config
    }

    /// Compiles `text` into a reusable query.
    pub fn new_query(&self, text: &str) -> Result<Query> {
        let compiled = optimizer::compile(text)?;
        debug!(query = compiled.text(), nodes = compiled.len(), "compiled query");
        Ok(Query {
            compiled: Arc::new(compiled),
            env: Arc::new(self.env.clone()),
        })
    }

    /// Defines an index named `name` over `expression`, evaluated for every
    /// value of the single iterator declared by `from` (for example
    /// `create_index("statusIdx", "p.status", "/portfolios p")`).
    ///
    /// Returns the created index, one per bucket for partitioned regions.
    pub fn create_index(
        &self,
        name: &str,
        expression: &str,
        from: &str,
    ) -> Result<Vec<Arc<RangeIndex>>> {
        let mut definition = parse_index_definition(expression, from)?;
        optimizer::transform(&mut definition)?;
        let root = definition.root();
        let (target, expr, region) = {
            let select = definition
                .root_select()
                .ok_or_else(|| QueryError::invalid_query("index definition must be an expression"))?;
            let [target] = select.iterators.as_slice() else {
                return Err(QueryError::unsupported(
                    "an index FROM clause must declare exactly one iterator",
                ));
            };
            let expr = match &select.projection {
                crate::ast::Projection::Columns(fields) if fields.len() == 1 => fields[0].expr,
                _ => return Err(QueryError::invalid_query("index expression must be a single value")),
            };
            let region = definition
                .iterator_collection(*target)
                .and_then(|c| indexed_region(&definition, c))
                .ok_or_else(|| {
                    QueryError::unsupported("an index FROM clause must iterate a region")
                })?;
            (*target, expr, region)
        };

        let handle = self
            .env
            .cache
            .handle(&region)
            .ok_or_else(|| QueryError::unresolved(format!("region /{} not found", region)))?;
        let relative = {
            let mut ctx = ExecutionContext::new(&definition, &self.env, &[], CancellationToken::new());
            ctx.compute_dependencies(root)?;
            ctx.relative_path(expr, target).ok_or_else(|| {
                QueryError::unsupported(format!(
                    "index expression {} must navigate from its iterator",
                    expression
                ))
            })?
        };

        // A key that fails to evaluate fails the creation, as a scan would.
        let key_of = key_evaluator(definition, target, expr, &self.env);
        for value in handle.as_region().values().map_err(QueryError::from_storage)? {
            key_of(&value)?;
        }
        let extractor =
            KeyExtractor::fallible(&relative, move |value| key_of(value).map_err(|e| e.to_string()));
        let created = handle
            .create_index(name, &relative, extractor)
            .map_err(QueryError::from_storage)?;
        info!(index = name, region = %region, expression = %relative, "created index");
        Ok(created)
    }
}

/// Names the region a FROM collection iterates, for `/R` and `/R.values`.
fn indexed_region(query: &CompiledQuery, collection: NodeId) -> Option<String> {
    match query.node(collection) {
        CompiledValue::RegionPath(path) => Some(path.trim_start_matches('/').to_owned()),
        CompiledValue::Path { receiver, attribute } if attribute == "values" => {
            indexed_region(query, *receiver)
        }
        CompiledValue::MethodInvocation {
            receiver: Some(receiver),
            name,
            args,
        } if name == "values" && args.is_empty() => indexed_region(query, *receiver),
        _ => None,
    }
}

/// Builds the function computing an index key from an entry value, with the
/// same attribute and method semantics as query evaluation. UNDEFINED keys come
/// back as `None`; evaluation errors are returned to the caller.
///
/// The function owns an environment over an empty cache so that an index never
/// keeps its own region alive.
fn key_evaluator(
    definition: CompiledQuery,
    target: NodeId,
    expr: NodeId,
    env: &QueryEnv,
) -> impl Fn(&Value) -> Result<Option<Value>> + Send + Sync + 'static {
    let definition = Arc::new(definition);
    let env = QueryEnv {
        cache: Arc::new(RegionCache::new()),
        registry: Arc::clone(&env.registry),
        authorizer: Arc::clone(&env.authorizer),
        config: env.config.clone(),
    };
    move |value: &Value| {
        let mut ctx = ExecutionContext::new(&definition, &env, &[], CancellationToken::new());
        ctx.scopes.push(vec![target]);
        ctx.compute_dependencies(expr)?;
        ctx.bind_iterator(target, value.clone());
        match ctx.evaluate(expr)? {
            Value::Undefined => Ok(None),
            key => Ok(Some(key)),
        }
    }
}

/// A compiled query bound to the service that created it.
///
/// Queries are immutable and may be executed concurrently.
#[derive(Clone, Debug)]
pub struct Query {
    compiled: Arc<CompiledQuery>,
    env: Arc<QueryEnv>,
}

impl Query {
    /// Returns the query text (without any `<trace>` hint).
    pub fn text(&self) -> &str {
        self.compiled.text()
    }

    pub fn compiled(&self) -> &CompiledQuery {
        &self.compiled
    }

    /// Runs the query with positional bind arguments (`$1` is `params[0]`).
    pub fn execute(&self, params: &[Value]) -> Result<QueryResults> {
        self.run(params, &CancellationToken::new(), None)
    }

    /// Runs the query, stopping with `Cancelled` once `token` fires.
    pub fn execute_with_cancel(
        &self,
        params: &[Value],
        token: &CancellationToken,
    ) -> Result<QueryResults> {
        self.run(params, token, None)
    }

    /// Runs the query on behalf of a data-aware function, over the function's
    /// buckets only. Joins between co-located partitioned regions are allowed.
    pub fn execute_in_function(
        &self,
        function: &FunctionContext,
        params: &[Value],
    ) -> Result<QueryResults> {
        self.run(params, function.cancellation(), Some(function.buckets()))
    }

    fn run(
        &self,
        params: &[Value],
        cancel: &CancellationToken,
        buckets: Option<&[BucketId]>,
    ) -> Result<QueryResults> {
        let started = Instant::now();
        let query = &*self.compiled;
        if params.len() < query.bind_count() {
            return Err(QueryError::invalid_query(format!(
                "query expects {} bind arguments, got {}",
                query.bind_count(),
                params.len()
            )));
        }
        cancel.check()?;

        let mut ctx = ExecutionContext::new(query, &self.env, params, cancel.clone());
        ctx.in_function = buckets.is_some();
        let root = query.root();
        ctx.compute_dependencies(root)?;

        let (results, stats) = if query.root_select().is_some() {
            match partitioned_target(&ctx)? {
                Some(region) => execute_partitioned(&mut ctx, &region, buckets, cancel)?,
                None => {
                    let results = ctx.execute_select(root)?;
                    (results, std::mem::take(&mut ctx.stats))
                }
            }
        } else {
            let value = ctx.evaluate(root)?;
            (QueryResults::single(value), RunStats::default())
        };

        self.report(&results, &stats, started);
        Ok(results)
    }

    fn report(&self, results: &QueryResults, stats: &RunStats, started: Instant) {
        let elapsed = started.elapsed();
        let rows = results.count_value().unwrap_or(results.len());
        if self.compiled.is_traced() || self.env.config.trace_all {
            info!(
                target: "tessera_query::trace",
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                rows,
                examined = stats.rows_examined,
                "Query Executed in {:.3} ms; rowCount = {}; indexesUsed({}):{}; \"{}\"",
                elapsed.as_secs_f64() * 1000.0,
                rows,
                stats.indexes_used.len(),
                stats.indexes_used.join(","),
                self.text()
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, rows, "query executed");
        }
    }
}

//! Queries over partitioned regions.
//!
//! A SELECT whose first FROM entry ranges over a partitioned region runs once
//! per bucket, each run confined to the bucket-local data, and the partial
//! results are merged: DISTINCT, ORDER BY and LIMIT are re-applied to the union
//! and COUNT(*) results are summed.
//!
//! Partitioned regions may appear elsewhere only as later FROM entries of a
//! query run inside a `FunctionContext`, and only when co-located with the first
//! one, so that every bucket-local join sees matching data.

use crate::ast::{CompiledValue, NodeId};
use crate::context::{Binding, CancellationToken, ExecutionContext, RunStats};
use crate::error::{QueryError, Result};
use crate::results::{
    ContainerSpec, QueryResults, ResultCollector, ResultContainer, RowComparator, RowOrdering,
    TupleShape,
};
use rayon::prelude::*;
use tessera_core::{BucketId, RegionRef};

/// Execution context of a data-aware function: the buckets it owns.
#[derive(Clone, Debug, Default)]
pub struct FunctionContext {
    buckets: Vec<BucketId>,
    cancel: CancellationToken,
}

impl FunctionContext {
    /// Creates a context owning `buckets`.
    pub fn new(buckets: impl IntoIterator<Item = BucketId>) -> Self {
        Self {
            buckets: buckets.into_iter().collect(),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to cancel queries run in this context.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn buckets(&self) -> &[BucketId] {
        &self.buckets
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

struct RegionMention {
    node: NodeId,
    name: String,
    /// FROM position in the root SELECT, or None outside its FROM clause.
    from_position: Option<usize>,
}

/// Returns the partitioned region a query must fan out over, after checking
/// the query's shape. Returns None for queries that touch no partitioned region.
pub(crate) fn partitioned_target(ctx: &ExecutionContext<'_>) -> Result<Option<RegionRef>> {
    let query = ctx.query;
    let refs = region_references(ctx);
    let mut partitioned = Vec::new();
    for r in refs {
        if let Some(region) = ctx.env.cache.region(&r.name) {
            if region.partition().is_some() {
                partitioned.push((r, region));
            }
        }
    }
    if partitioned.is_empty() {
        return Ok(None);
    }
    let Some(select) = query.root_select() else {
        // A plain expression such as `/PR.size` reads the region as a whole.
        return Ok(None);
    };

    let first = partitioned
        .iter()
        .find(|(r, _)| r.from_position == Some(0))
        .map(|(_, region)| region.clone())
        .ok_or_else(|| {
            QueryError::unsupported(
                "a partitioned region may only be queried as the first FROM entry",
            )
        })?;

    for (r, region) in &partitioned {
        match r.from_position {
            Some(0) => {}
            Some(position) => {
                if !ctx.in_function {
                    return Err(QueryError::unsupported(format!(
                        "FROM entry {} joins partitioned region /{}; joins between partitioned \
                         regions require a function context",
                        position + 1,
                        r.name
                    )));
                }
                if !colocated(ctx, first.name(), region.name()) {
                    return Err(QueryError::unsupported(format!(
                        "partitioned regions /{} and /{} are not co-located",
                        first.name(),
                        region.name()
                    )));
                }
            }
            None => {
                return Err(QueryError::unsupported(format!(
                    "partitioned region /{} may not be referenced outside the FROM clause",
                    r.name
                )))
            }
        }
        tracing::trace!(node = r.node.index(), region = %r.name, "partitioned reference");
    }

    if select.plan.has_unmapped_order_by {
        return Err(QueryError::invalid_query(
            "ORDER BY on a partitioned region must use projected columns",
        ));
    }
    Ok(Some(first))
}

fn colocation_root(ctx: &ExecutionContext<'_>, name: &str) -> String {
    let mut current = name.to_owned();
    for _ in 0..ctx.env.cache.region_count() {
        let parent = ctx
            .env
            .cache
            .region(&current)
            .and_then(|r| r.partition())
            .and_then(|p| p.colocated_with);
        match parent {
            Some(parent) => current = parent.trim_start_matches('/').to_owned(),
            None => break,
        }
    }
    current
}

fn colocated(ctx: &ExecutionContext<'_>, a: &str, b: &str) -> bool {
    colocation_root(ctx, a) == colocation_root(ctx, b)
}

/// Lists every region reference with where it occurs.
fn region_references(ctx: &ExecutionContext<'_>) -> Vec<RegionMention> {
    let query = ctx.query;
    let mut out = Vec::new();
    match query.root_select() {
        Some(select) => {
            for (position, def) in select.iterators.iter().enumerate() {
                collect(ctx, *def, Some(position), &mut out);
            }
            for child in query.children(query.root()) {
                if !select.iterators.contains(&child) {
                    collect(ctx, child, None, &mut out);
                }
            }
        }
        None => collect(ctx, query.root(), None, &mut out),
    }
    out
}

fn collect(ctx: &ExecutionContext<'_>, id: NodeId, position: Option<usize>, out: &mut Vec<RegionMention>) {
    let query = ctx.query;
    match query.node(id) {
        CompiledValue::RegionPath(path) => out.push(RegionMention {
            node: id,
            name: path.trim_start_matches('/').to_owned(),
            from_position: position,
        }),
        CompiledValue::Identifier(_) => {
            if let Some(Binding::Region(name)) = ctx.bindings.get(&id) {
                out.push(RegionMention {
                    node: id,
                    name: name.clone(),
                    from_position: position,
                });
            }
        }
        // References inside a nested SELECT are never FROM entries of the root.
        CompiledValue::Select(_) => {
            for child in query.children(id) {
                collect(ctx, child, None, out);
            }
        }
        _ => {
            for child in query.children(id) {
                collect(ctx, child, position, out);
            }
        }
    }
}

/// Runs the root SELECT once per bucket and merges the partial results.
pub(crate) fn execute_partitioned(
    ctx: &mut ExecutionContext<'_>,
    region: &RegionRef,
    buckets: Option<&[BucketId]>,
    cancel: &CancellationToken,
) -> Result<(QueryResults, RunStats)> {
    let query = ctx.query;
    let root = query.root();
    let select = query
        .root_select()
        .ok_or_else(|| QueryError::invalid_query("expected a SELECT"))?;
    let bucket_count = region.partition().map_or(0, |p| p.bucket_count);
    let buckets: Vec<BucketId> = match buckets {
        Some(owned) => owned.to_vec(),
        None => (0..bucket_count).collect(),
    };
    if let Some(bad) = buckets.iter().find(|b| **b >= bucket_count) {
        return Err(QueryError::RegionUnavailable(format!(
            "bucket {} does not exist in /{} ({} buckets)",
            bad,
            region.name(),
            bucket_count
        )));
    }
    let limit = ctx.limit_of(select)?;

    let env = ctx.env;
    let params = ctx.params();
    let in_function = ctx.in_function;
    let run = |bucket: BucketId| -> Result<(QueryResults, RunStats)> {
        let mut local = ExecutionContext::new(query, env, params, cancel.clone())
            .for_bucket(bucket, in_function);
        local.compute_dependencies(root)?;
        let results = local.run_select(root, true)?;
        tracing::trace!(bucket, rows = results.len(), "bucket query finished");
        Ok((results, local.stats))
    };
    let partials: Vec<Result<(QueryResults, RunStats)>> = if env.config.parallel_buckets {
        buckets.par_iter().map(|b| run(*b)).collect()
    } else {
        buckets.iter().map(|b| run(*b)).collect()
    };

    let spec = ContainerSpec {
        ordered: select.is_ordered(),
        distinct: select.distinct,
        is_struct: select.is_struct(),
        ignore_order_by: false,
        count: select.is_count(),
        limit,
        comparator: RowComparator::default(),
    };
    let mut merged: Option<ResultContainer> = None;
    let mut stats = RunStats::default();
    for partial in partials {
        let (results, bucket_stats) = partial?;
        stats.rows_examined += bucket_stats.rows_examined;
        for name in bucket_stats.indexes_used {
            if !stats.indexes_used.contains(&name) {
                stats.indexes_used.push(name);
            }
        }
        // Bucket results carry the ORDER BY directions they were sorted with.
        let container = merged.get_or_insert_with(|| {
            let spec = ContainerSpec {
                comparator: results.comparator().cloned().unwrap_or_default(),
                ..spec.clone()
            };
            ResultContainer::new(spec, results.struct_type().cloned())
        });
        if select.is_count() && !select.distinct {
            container.add_count(results.count_value().unwrap_or(0));
            continue;
        }
        for (row, key) in results.into_keyed() {
            container.add(row, key);
            if container.is_full() {
                break;
            }
        }
    }
    let merged = merged.unwrap_or_else(|| ResultContainer::new(spec, None));
    tracing::debug!(
        region = region.name(),
        buckets = buckets.len(),
        rows = merged.len(),
        "merged bucket results"
    );
    Ok((merged.finish(false), stats))
}

//! SELECT evaluation by nested iteration.

use super::filter::IndexLockGuard;
use crate::ast::{NodeId, Projection, SelectNode};
use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::results::{ContainerSpec, QueryResults, ResultCollector, ResultContainer, RowComparator};
use std::sync::Arc;
use tessera_core::{StructType, Value};

impl ExecutionContext<'_> {
    /// Evaluates a SELECT to its final result.
    pub(crate) fn execute_select(&mut self, id: NodeId) -> Result<QueryResults> {
        self.run_select(id, false)
    }

    /// Evaluates a SELECT. A `partial` run produces rows that are merged with
    /// other buckets later: sorted rows keep their key values and a DISTINCT
    /// COUNT(*) returns its distinct rows instead of their number.
    pub(crate) fn run_select(&mut self, id: NodeId, partial: bool) -> Result<QueryResults> {
        let query = self.query;
        let select = query
            .select(id)
            .ok_or_else(|| QueryError::invalid_query("expected a SELECT"))?;
        let limit = self.limit_of(select)?;
        let shape = self.row_shape(select);
        let count = select.is_count() && !(partial && select.distinct);

        if count && !select.distinct && select.where_clause.is_none() && limit.is_none() {
            if let [only] = select.iterators.as_slice() {
                if let Some(region) = self.iterated_region(*only)? {
                    return Ok(QueryResults::count(region.size()));
                }
            }
        }

        let mut spec = ContainerSpec {
            ordered: select.is_ordered(),
            distinct: select.distinct,
            is_struct: shape.is_some(),
            ignore_order_by: false,
            count,
            limit,
            comparator: RowComparator::new(
                select.plan.sort_keys.iter().map(|k| k.descending).collect(),
            ),
        };

        if let Some(target) = self.bulk_fetch_target(select)? {
            let mut container = ResultContainer::new(spec, shape.clone());
            self.bulk_fetch(select, &shape, target, &mut container)?;
            return Ok(container.finish(partial));
        }

        let plan = self.plan_for(id, select)?;
        let Some(filter_shape) = plan.shape.as_ref() else {
            let mut container = ResultContainer::new(spec, shape.clone());
            self.iterate(select, 0, &plan.residual, &shape, &mut container)?;
            return Ok(container.finish(partial));
        };

        let guard = IndexLockGuard::acquire(&plan.indexes);
        let filter = self.build_filter(filter_shape)?;
        let single = filter.single_lookup().map(|(slot, _)| slot);
        let ordered_by_index =
            select.is_ordered() && single.is_some() && single == plan.order_index;
        let descending = ordered_by_index && select.plan.sort_keys[0].descending;
        // Bucket rows are re-sorted when merged, so they keep their keys.
        spec.ignore_order_by = ordered_by_index && !partial;
        let index_limit = limit.filter(|_| {
            self.config().limit_pushdown
                && select.plan.limit_pushdown_eligible
                && plan.residual.is_empty()
                && single.is_some()
                && (!select.is_ordered() || ordered_by_index)
                && (!select.distinct || matches!(select.projection, Projection::All))
                && !select.is_count()
        });
        let candidates = self.run_filter(&filter, &guard, descending, index_limit)?;

        let mut container = ResultContainer::new(spec, shape.clone());
        let target = select.iterators[0];
        for entry in candidates {
            self.check_cancelled()?;
            if entry.is_destroyed() {
                continue;
            }
            self.stats.rows_examined += 1;
            self.bind_iterator(target, entry.value().clone());
            self.iterate(select, 1, &plan.residual, &shape, &mut container)?;
            if container.is_full() {
                break;
            }
        }
        drop(guard);
        Ok(container.finish(partial))
    }

    /// Binds iterators from `level` on and adds every row that passes
    /// `conditions`.
    pub(crate) fn iterate(
        &mut self,
        select: &SelectNode,
        level: usize,
        conditions: &[NodeId],
        shape: &Option<Arc<StructType>>,
        container: &mut ResultContainer,
    ) -> Result<()> {
        if level >= select.iterators.len() {
            for condition in conditions {
                if !self.evaluate_condition(*condition)? {
                    return Ok(());
                }
            }
            let row = self.project(select, shape)?;
            let mut key = Vec::with_capacity(select.plan.sort_keys.len());
            for sort_key in &select.plan.sort_keys {
                key.push(self.evaluate(sort_key.expr)?);
            }
            container.add(row, key);
            return Ok(());
        }
        let def = select.iterators[level];
        for value in self.iteration_values(def)? {
            if level == 0 {
                self.check_cancelled()?;
                self.stats.rows_examined += 1;
            }
            self.bind_iterator(def, value);
            self.iterate(select, level + 1, conditions, shape, container)?;
            if container.is_full() {
                break;
            }
        }
        Ok(())
    }

    fn project(&mut self, select: &SelectNode, shape: &Option<Arc<StructType>>) -> Result<Value> {
        let mut values = match &select.projection {
            Projection::Columns(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(self.evaluate(field.expr)?);
                }
                values
            }
            Projection::All | Projection::Count => select
                .iterators
                .iter()
                .map(|def| self.iterator_value(*def))
                .collect(),
        };
        Ok(match shape {
            Some(ty) => Value::structure(ty.clone(), values),
            None => values.pop().unwrap_or(Value::Undefined),
        })
    }

    /// Returns the struct type of multi-column rows.
    fn row_shape(&self, select: &SelectNode) -> Option<Arc<StructType>> {
        let names: Vec<String> = match &select.projection {
            Projection::Columns(fields) if fields.len() > 1 => {
                fields.iter().map(|f| f.name.clone()).collect()
            }
            Projection::All | Projection::Count if select.iterators.len() > 1 => select
                .iterators
                .iter()
                .enumerate()
                .map(|(i, def)| {
                    self.query
                        .iterator_name(*def)
                        .map_or_else(|| format!("iter{}", i), str::to_owned)
                })
                .collect(),
            _ => return None,
        };
        Some(Arc::new(StructType::new(names)))
    }

    pub(crate) fn limit_of(&mut self, select: &SelectNode) -> Result<Option<usize>> {
        let Some(node) = select.limit else {
            return Ok(None);
        };
        let value = self.evaluate(node)?;
        match value.as_i64().map(usize::try_from) {
            Some(Ok(limit)) => Ok(Some(limit)),
            _ => Err(QueryError::invalid_query(format!(
                "LIMIT must be a non-negative integer, got {}",
                value
            ))),
        }
    }
}

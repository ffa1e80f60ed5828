//! Index selection for WHERE clauses.
//!
//! Only the first FROM iterator can be answered from an index, and only when it
//! ranges over a plain region (`/R` or `/R.values`). A conjunct qualifies when
//! one side is an attribute chain of that iterator matching an index's
//! expression and the other side does not read any iterator of the SELECT.
//! Conjuncts that do not qualify stay in the residual list and are evaluated
//! for every candidate.

use crate::ast::{CompiledValue, ComparisonOp, JunctionOp, NodeId, RootKind, SelectNode};
use crate::context::{Binding, ExecutionContext};
use crate::error::{QueryError, Result};
use hashbrown::HashSet;
use std::rc::Rc;
use tessera_core::{EntryRef, IndexLookup, IndexRef, IndexView, RegionRef, Value};

/// How an indexed conjunct looks up its index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LookupKind {
    Compare(ComparisonOp),
    In,
}

/// Index-answerable part of a WHERE clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FilterShape {
    Lookup {
        /// Position in `PlanInfo::indexes`.
        index: usize,
        kind: LookupKind,
        /// Expression giving the lookup value.
        operand: NodeId,
    },
    /// Intersection.
    And(Vec<FilterShape>),
    /// Union.
    Or(Vec<FilterShape>),
}

/// Per-run plan of one SELECT, computed once and reused for every evaluation
/// of that SELECT in the run.
#[derive(Clone, Debug, Default)]
pub(crate) struct PlanInfo {
    pub(crate) indexes: Vec<IndexRef>,
    pub(crate) shape: Option<FilterShape>,
    /// WHERE conjuncts evaluated per row.
    pub(crate) residual: Vec<NodeId>,
    /// Index whose key order is the ORDER BY order.
    pub(crate) order_index: Option<usize>,
}

impl PlanInfo {
    fn brute_force(select: &SelectNode) -> Self {
        Self {
            residual: select.where_clause.into_iter().collect(),
            ..Default::default()
        }
    }
}

/// Index read-locks held for one SELECT evaluation. Dropping the guard releases
/// every lock, on success and on error alike.
pub(crate) struct IndexLockGuard {
    views: Vec<Box<dyn IndexView>>,
}

impl IndexLockGuard {
    pub(crate) fn acquire(indexes: &[IndexRef]) -> Self {
        Self {
            views: indexes
                .iter()
                .map(|index| index.acquire_read_lock_for_query())
                .collect(),
        }
    }

    pub(crate) fn view(&self, slot: usize) -> Option<&dyn IndexView> {
        self.views.get(slot).map(|v| v.as_ref())
    }
}

impl Drop for IndexLockGuard {
    fn drop(&mut self) {
        if !self.views.is_empty() {
            tracing::trace!(locks = self.views.len(), "released index read-locks");
        }
    }
}

/// Concrete lookups of one evaluation.
#[derive(Clone, Debug)]
pub(crate) enum FilterPlan {
    Lookup { index: usize, lookup: IndexLookup },
    And(Vec<FilterPlan>),
    Or(Vec<FilterPlan>),
}

impl FilterPlan {
    /// Returns the single lookup this plan consists of, if any.
    pub(crate) fn single_lookup(&self) -> Option<(usize, &IndexLookup)> {
        match self {
            FilterPlan::Lookup { index, lookup } => Some((*index, lookup)),
            _ => None,
        }
    }
}

impl ExecutionContext<'_> {
    /// Returns the region an expression names directly (`/R`, or a name bound to a region).
    pub(crate) fn region_named_by(&mut self, id: NodeId) -> Result<Option<RegionRef>> {
        let name = match self.query.node(id) {
            CompiledValue::RegionPath(path) => path.clone(),
            CompiledValue::Identifier(_) => match self.bindings.get(&id) {
                Some(Binding::Region(name)) => name.clone(),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        self.region(&name).map(Some)
    }

    /// Returns the region an iterator ranges over, when it ranges over a plain
    /// region's values.
    pub(crate) fn iterated_region(&mut self, def: NodeId) -> Result<Option<RegionRef>> {
        let Some(collection) = self.query.iterator_collection(def) else {
            return Ok(None);
        };
        match self.query.node(collection) {
            CompiledValue::Path {
                receiver,
                attribute,
            } if attribute == "values" => self.region_named_by(*receiver),
            _ => self.region_named_by(collection),
        }
    }

    /// Returns the plan for a SELECT, computing it on first use in the run.
    pub(crate) fn plan_for(&mut self, id: NodeId, select: &SelectNode) -> Result<Rc<PlanInfo>> {
        if let Some(plan) = self.plans.get(&id) {
            return Ok(plan.clone());
        }
        let plan = Rc::new(self.analyse(select)?);
        if plan.shape.is_some() {
            tracing::debug!(
                select = id.index(),
                indexes = ?plan.indexes.iter().map(|i| i.name().to_owned()).collect::<Vec<_>>(),
                residual = plan.residual.len(),
                "using indexes"
            );
        }
        self.plans.insert(id, plan.clone());
        Ok(plan)
    }

    fn analyse(&mut self, select: &SelectNode) -> Result<PlanInfo> {
        let brute = PlanInfo::brute_force(select);
        if !self.config().index_usage {
            return Ok(brute);
        }
        let Some(&target) = select.iterators.first() else {
            return Ok(brute);
        };
        let Some(region) = self.iterated_region(target)? else {
            return Ok(brute);
        };
        let available = region.indexes();
        if available.is_empty() {
            return Ok(brute);
        }

        let mut plan = PlanInfo::default();
        if let Some(where_clause) = select.where_clause {
            let conjuncts = match self.query.node(where_clause) {
                CompiledValue::Junction {
                    op: JunctionOp::And,
                    operands,
                } => operands.clone(),
                _ => vec![where_clause],
            };
            let mut shapes = Vec::new();
            for conjunct in conjuncts {
                match self.shape_of(conjunct, target, select, &available, &mut plan.indexes) {
                    Some(shape) => shapes.push(shape),
                    None => plan.residual.push(conjunct),
                }
            }
            plan.shape = match shapes.len() {
                0 => None,
                1 => shapes.pop(),
                _ => Some(FilterShape::And(shapes)),
            };
        }
        if plan.shape.is_none() {
            return Ok(brute);
        }
        if select.iterators.len() == 1 && select.plan.sort_keys.len() == 1 {
            let key = select.plan.sort_keys[0].expr;
            if let Some(path) = self.relative_path(key, target) {
                plan.order_index = plan
                    .indexes
                    .iter()
                    .position(|index| index.indexed_expression() == path);
            }
        }
        Ok(plan)
    }

    pub(crate) fn relative_path(&self, id: NodeId, target: NodeId) -> Option<String> {
        let classify = |node: NodeId| match self.bindings.get(&node) {
            Some(Binding::Iterator(def)) if *def == target => RootKind::Iterator,
            Some(Binding::Implicit(def)) if *def == target => RootKind::ImplicitAttribute,
            _ => RootKind::Other,
        };
        self.query.relative_canonical(id, &classify)
    }

    fn slot_for(
        &self,
        path: &str,
        available: &[IndexRef],
        used: &mut Vec<IndexRef>,
    ) -> Option<usize> {
        let index = available.iter().find(|i| i.indexed_expression() == path)?;
        if let Some(slot) = used.iter().position(|u| u.name() == index.name()) {
            return Some(slot);
        }
        used.push(index.clone());
        Some(used.len() - 1)
    }

    fn shape_of(
        &self,
        id: NodeId,
        target: NodeId,
        select: &SelectNode,
        available: &[IndexRef],
        used: &mut Vec<IndexRef>,
    ) -> Option<FilterShape> {
        let constant = |node: NodeId| self.independent_of(node, &select.iterators);
        match self.query.node(id) {
            CompiledValue::Comparison { op, left, right } if *op != ComparisonOp::Ne => {
                let (path, operand, op) = match self.relative_path(*left, target) {
                    Some(path) if constant(*right) => (path, *right, *op),
                    _ => match self.relative_path(*right, target) {
                        Some(path) if constant(*left) => (path, *left, op.flip()),
                        _ => return None,
                    },
                };
                let index = self.slot_for(&path, available, used)?;
                Some(FilterShape::Lookup {
                    index,
                    kind: LookupKind::Compare(op),
                    operand,
                })
            }
            CompiledValue::In {
                element,
                collection,
            } if constant(*collection) => {
                let path = self.relative_path(*element, target)?;
                let index = self.slot_for(&path, available, used)?;
                Some(FilterShape::Lookup {
                    index,
                    kind: LookupKind::In,
                    operand: *collection,
                })
            }
            CompiledValue::Junction { op, operands } => {
                // Every operand must be indexable, or the junction as a whole is not.
                let mut parts = Vec::with_capacity(operands.len());
                let mut scratch = used.clone();
                for operand in operands {
                    parts.push(self.shape_of(*operand, target, select, available, &mut scratch)?);
                }
                *used = scratch;
                Some(match op {
                    JunctionOp::And => FilterShape::And(parts),
                    JunctionOp::Or => FilterShape::Or(parts),
                })
            }
            _ => None,
        }
    }

    /// Evaluates the lookup values of a filter shape.
    pub(crate) fn build_filter(&mut self, shape: &FilterShape) -> Result<FilterPlan> {
        match shape {
            FilterShape::Lookup {
                index,
                kind,
                operand,
            } => {
                let value = self.evaluate(*operand)?;
                let lookup = match kind {
                    LookupKind::Compare(op) => match op {
                        ComparisonOp::Eq => IndexLookup::Equal(value),
                        ComparisonOp::Lt => IndexLookup::less(value, false),
                        ComparisonOp::Le => IndexLookup::less(value, true),
                        ComparisonOp::Gt => IndexLookup::greater(value, false),
                        ComparisonOp::Ge => IndexLookup::greater(value, true),
                        ComparisonOp::Ne => {
                            return Err(QueryError::invalid_query("<> cannot use an index"))
                        }
                    },
                    LookupKind::In => match value {
                        Value::Undefined | Value::Null => IndexLookup::In(Vec::new()),
                        Value::Collection(items) => IndexLookup::In(items.as_ref().clone()),
                        other => {
                            return Err(QueryError::type_mismatch("Collection", other.data_type()))
                        }
                    },
                };
                Ok(FilterPlan::Lookup {
                    index: *index,
                    lookup,
                })
            }
            FilterShape::And(parts) => {
                let mut built: Vec<FilterPlan> = Vec::with_capacity(parts.len());
                for part in parts {
                    let next = self.build_filter(part)?;
                    // Lookups on the same index fold into one where possible.
                    if let FilterPlan::Lookup { index, lookup } = &next {
                        let mut folded = false;
                        for existing in built.iter_mut() {
                            if let FilterPlan::Lookup {
                                index: slot,
                                lookup: current,
                            } = existing
                            {
                                if *slot == *index {
                                    if let Some(combined) = current.intersect(lookup) {
                                        *current = combined;
                                        folded = true;
                                        break;
                                    }
                                }
                            }
                        }
                        if folded {
                            continue;
                        }
                    }
                    built.push(next);
                }
                Ok(if built.len() == 1 {
                    built.remove(0)
                } else {
                    FilterPlan::And(built)
                })
            }
            FilterShape::Or(parts) => {
                let mut built = Vec::with_capacity(parts.len());
                for part in parts {
                    built.push(self.build_filter(part)?);
                }
                Ok(FilterPlan::Or(built))
            }
        }
    }

    /// Runs a filter plan against locked index views. `order` asks the single
    /// lookup of a plan for descending order and a row limit.
    pub(crate) fn run_filter(
        &mut self,
        plan: &FilterPlan,
        guard: &IndexLockGuard,
        descending: bool,
        limit: Option<usize>,
    ) -> Result<Vec<EntryRef>> {
        match plan {
            FilterPlan::Lookup { index, lookup } => {
                self.check_cancelled()?;
                let view = guard.view(*index).ok_or_else(|| {
                    QueryError::invalid_query(format!("index slot {} is not locked", index))
                })?;
                let name = view.index_name().to_owned();
                if !self.stats.indexes_used.contains(&name) {
                    self.stats.indexes_used.push(name);
                }
                view.lookup(lookup, descending, limit)
                    .map_err(QueryError::from_index)
            }
            FilterPlan::And(parts) => {
                let mut result: Option<Vec<EntryRef>> = None;
                for part in parts {
                    let next = self.run_filter(part, guard, false, None)?;
                    result = Some(match result {
                        None => next,
                        Some(acc) => {
                            let keep: HashSet<*const _> =
                                next.iter().map(|e| EntryRef::as_ptr(e)).collect();
                            acc.into_iter()
                                .filter(|e| keep.contains(&EntryRef::as_ptr(e)))
                                .collect()
                        }
                    });
                }
                Ok(result.unwrap_or_default())
            }
            FilterPlan::Or(parts) => {
                let mut seen = HashSet::new();
                let mut union = Vec::new();
                for part in parts {
                    for entry in self.run_filter(part, guard, false, None)? {
                        if seen.insert(EntryRef::as_ptr(&entry)) {
                            union.push(entry);
                        }
                    }
                }
                Ok(union)
            }
        }
    }
}

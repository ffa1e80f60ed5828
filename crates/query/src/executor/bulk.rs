//! Bulk key fetch.
//!
//! `SELECT ... FROM /R.entrySet e WHERE e.key IN <keys>` does not need to scan
//! the region: each key is looked up directly.

use crate::ast::{CompiledValue, JunctionOp, NodeId, SelectNode};
use crate::context::{Binding, ExecutionContext};
use crate::error::{QueryError, Result};
use crate::results::{ResultCollector, ResultContainer};
use hashbrown::HashSet;
use std::sync::Arc;
use tessera_core::{RegionRef, StructType, Value};

pub(crate) struct BulkTarget {
    region: RegionRef,
    keys: NodeId,
    residual: Vec<NodeId>,
}

impl ExecutionContext<'_> {
    pub(crate) fn bulk_fetch_target(&mut self, select: &SelectNode) -> Result<Option<BulkTarget>> {
        let query = self.query;
        if !self.config().bulk_fetch {
            return Ok(None);
        }
        let ([def], Some(where_clause)) = (select.iterators.as_slice(), select.where_clause) else {
            return Ok(None);
        };
        let Some(collection) = query.iterator_collection(*def) else {
            return Ok(None);
        };
        let receiver = match query.node(collection) {
            CompiledValue::Path {
                receiver,
                attribute,
            } if attribute == "entrySet" || attribute == "entries" => *receiver,
            CompiledValue::MethodInvocation {
                receiver: Some(receiver),
                name,
                args,
            } if name == "entrySet" && args.is_empty() => *receiver,
            _ => return Ok(None),
        };
        let mut conjuncts = match query.node(where_clause) {
            CompiledValue::Junction {
                op: JunctionOp::And,
                operands,
            } => operands.clone(),
            _ => vec![where_clause],
        };
        let Some(position) = conjuncts.iter().position(|c| match query.node(*c) {
            CompiledValue::In {
                element,
                collection,
            } => self.is_entry_key(*element, *def) && self.independent_of(*collection, &[*def]),
            _ => false,
        }) else {
            return Ok(None);
        };
        let keys = match query.node(conjuncts.remove(position)) {
            CompiledValue::In { collection, .. } => *collection,
            _ => return Ok(None),
        };
        let Some(region) = self.region_named_by(receiver)? else {
            return Ok(None);
        };
        Ok(Some(BulkTarget {
            region,
            keys,
            residual: conjuncts,
        }))
    }

    fn is_entry_key(&self, id: NodeId, def: NodeId) -> bool {
        let receiver = match self.query.node(id) {
            CompiledValue::Path {
                receiver,
                attribute,
            } if attribute == "key" => *receiver,
            CompiledValue::MethodInvocation {
                receiver: Some(receiver),
                name,
                args,
            } if name == "getKey" && args.is_empty() => *receiver,
            _ => return false,
        };
        self.bindings.get(&receiver) == Some(&Binding::Iterator(def))
    }

    pub(crate) fn bulk_fetch(
        &mut self,
        select: &SelectNode,
        shape: &Option<Arc<StructType>>,
        target: BulkTarget,
        container: &mut ResultContainer,
    ) -> Result<()> {
        let keys = match self.evaluate(target.keys)? {
            Value::Undefined | Value::Null => return Ok(()),
            Value::Collection(items) => items,
            other => return Err(QueryError::type_mismatch("Collection", other.data_type())),
        };
        tracing::debug!(region = target.region.name(), keys = keys.len(), "bulk key fetch");
        let def = select.iterators[0];
        let mut seen = HashSet::new();
        for key in keys.iter() {
            self.check_cancelled()?;
            let Some(entry) = target.region.get_entry(key) else {
                continue;
            };
            if entry.is_destroyed() || !seen.insert(Arc::as_ptr(&entry)) {
                continue;
            }
            self.stats.rows_examined += 1;
            self.bind_iterator(def, Value::Entry(entry));
            self.iterate(select, 1, &target.residual, shape, container)?;
            if container.is_full() {
                break;
            }
        }
        Ok(())
    }
}

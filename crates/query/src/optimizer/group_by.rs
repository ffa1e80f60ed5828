//! GROUP BY rewrite.

use super::CompilePass;
use crate::ast::{CompiledQuery, CompiledValue, NodeId, Projection};
use crate::error::{QueryError, Result};

/// Rewrites `SELECT a, b ... GROUP BY a, b` into `SELECT DISTINCT a, b ... ORDER BY a, b`.
///
/// The GROUP BY list must equal the projection list, column for column. An
/// explicit ORDER BY is kept as written.
pub struct GroupByRewrite;

impl CompilePass for GroupByRewrite {
    fn apply(&self, query: &mut CompiledQuery, id: NodeId) -> Result<()> {
        let Some(select) = query.select(id) else {
            return Ok(());
        };
        if select.group_by.is_empty() {
            return Ok(());
        }
        let columns: Vec<NodeId> = match &select.projection {
            Projection::Columns(fields) => fields.iter().map(|f| f.expr).collect(),
            _ => {
                return Err(QueryError::invalid_query(
                    "GROUP BY requires an explicit projection list",
                ))
            }
        };
        let group_by = select.group_by.clone();
        let matches = columns.len() == group_by.len()
            && columns
                .iter()
                .zip(&group_by)
                .all(|(c, g)| query.canonical(*c) == query.canonical(*g));
        if !matches {
            return Err(QueryError::invalid_query(
                "GROUP BY list must match the projection list",
            ));
        }

        let add_order_by = select.order_by.is_empty();
        let criteria: Vec<NodeId> = if add_order_by {
            group_by
                .iter()
                .map(|g| {
                    query.push(CompiledValue::SortCriterion {
                        expr: *g,
                        descending: false,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        if let CompiledValue::Select(select) = query.node_mut(id) {
            select.distinct = true;
            if add_order_by {
                select.order_by = criteria;
            }
            select.group_by.clear();
            select.plan.group_by_rewritten = true;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "group_by_rewrite"
    }
}

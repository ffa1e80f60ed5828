//! ORDER BY analysis.

use super::CompilePass;
use crate::ast::{CompiledQuery, CompiledValue, NodeId, Projection, SortKey, SortMapping};
use crate::error::{QueryError, Result};

/// Maps every ORDER BY key onto the projection.
///
/// A key equal to a projected column (or naming its alias) maps to that column.
/// A key computable from projected iterator values is derived. Anything else is
/// unmapped, which DISTINCT queries reject since the key would be lost before
/// duplicates are removed.
pub struct OrderByAnalysis;

impl CompilePass for OrderByAnalysis {
    fn apply(&self, query: &mut CompiledQuery, id: NodeId) -> Result<()> {
        let Some(select) = query.select(id) else {
            return Ok(());
        };
        if select.order_by.is_empty() {
            return Ok(());
        }
        if select.is_count() {
            return Err(QueryError::invalid_query("ORDER BY cannot be used with COUNT(*)"));
        }

        let iterator_names: Vec<&str> = select
            .iterators
            .iter()
            .filter_map(|it| query.iterator_name(*it))
            .collect();
        let mut keys = Vec::with_capacity(select.order_by.len());
        for criterion in &select.order_by {
            let CompiledValue::SortCriterion { expr, descending } = query.node(*criterion) else {
                continue;
            };
            let mapping = match &select.projection {
                Projection::All | Projection::Count => SortMapping::Derived,
                Projection::Columns(fields) => {
                    let canonical = query.canonical(*expr);
                    let alias = match query.node(*expr) {
                        CompiledValue::Identifier(name) => Some(name.as_str()),
                        _ => None,
                    };
                    match fields.iter().position(|f| {
                        Some(f.name.as_str()) == alias || query.canonical(f.expr) == canonical
                    }) {
                        Some(column) => SortMapping::Column(column),
                        None => {
                            let projected: Vec<&str> = fields
                                .iter()
                                .filter_map(|f| match query.node(f.expr) {
                                    CompiledValue::Identifier(n)
                                        if iterator_names.contains(&n.as_str()) =>
                                    {
                                        Some(n.as_str())
                                    }
                                    _ => None,
                                })
                                .collect();
                            if derivable(query, *expr, &projected) {
                                SortMapping::Derived
                            } else {
                                SortMapping::Unmapped
                            }
                        }
                    }
                }
            };
            keys.push(SortKey {
                expr: *expr,
                descending: *descending,
                mapping,
            });
        }

        let unmapped = keys.iter().any(|k| k.mapping == SortMapping::Unmapped);
        if unmapped && select.distinct {
            return Err(QueryError::invalid_query(
                "ORDER BY columns must appear in the projection list of a DISTINCT query",
            ));
        }
        if let CompiledValue::Select(select) = query.node_mut(id) {
            select.plan.sort_keys = keys;
            select.plan.has_unmapped_order_by = unmapped;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "order_by_analysis"
    }
}

/// Returns true if every name the expression reads is a projected iterator.
/// Receiver-less method calls read an implicit iterator and are never derivable.
fn derivable(query: &CompiledQuery, id: NodeId, projected: &[&str]) -> bool {
    match query.node(id) {
        CompiledValue::Identifier(name) => projected.contains(&name.as_str()),
        CompiledValue::MethodInvocation { receiver: None, .. } => false,
        CompiledValue::Select(_) => false,
        _ => query
            .children(id)
            .into_iter()
            .all(|child| derivable(query, child, projected)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;

    fn analyse(text: &str) -> Result<Vec<SortMapping>> {
        let mut q = parse_query(text)?;
        let root = q.root();
        OrderByAnalysis.apply(&mut q, root)?;
        Ok(q.root_select()
            .unwrap()
            .plan
            .sort_keys
            .iter()
            .map(|k| k.mapping)
            .collect())
    }

    #[test]
    fn test_column_and_alias_mapping() {
        assert_eq!(
            analyse("SELECT p.ID, p.status FROM /R p ORDER BY p.status, p.ID DESC").unwrap(),
            vec![SortMapping::Column(1), SortMapping::Column(0)]
        );
        assert_eq!(
            analyse("SELECT p.ID AS ident FROM /R p ORDER BY ident").unwrap(),
            vec![SortMapping::Column(0)]
        );
    }

    #[test]
    fn test_derived_mapping() {
        assert_eq!(
            analyse("SELECT * FROM /R p ORDER BY p.status").unwrap(),
            vec![SortMapping::Derived]
        );
        assert_eq!(
            analyse("SELECT p, q.ID FROM /R p, /S q ORDER BY p.status").unwrap(),
            vec![SortMapping::Derived]
        );
    }

    #[test]
    fn test_unmapped_mapping() {
        assert_eq!(
            analyse("SELECT p.ID FROM /R p ORDER BY p.status").unwrap(),
            vec![SortMapping::Unmapped]
        );
        assert_eq!(
            analyse("SELECT p.ID FROM /R p ORDER BY status").unwrap(),
            vec![SortMapping::Unmapped]
        );
    }

    #[test]
    fn test_distinct_with_unmapped_key_is_rejected() {
        let err = analyse("SELECT DISTINCT p.ID FROM /R p ORDER BY p.status").unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery { .. }));
        assert!(analyse("SELECT DISTINCT p.ID FROM /R p ORDER BY p.ID").is_ok());
    }

    #[test]
    fn test_count_with_order_by_is_rejected() {
        assert!(analyse("SELECT COUNT(*) FROM /R p ORDER BY p.ID").is_err());
    }
}

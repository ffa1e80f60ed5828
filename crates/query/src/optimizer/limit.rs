//! LIMIT pushdown eligibility.

use super::CompilePass;
use crate::ast::{CompiledQuery, CompiledValue, NodeId};
use crate::error::Result;

/// Marks SELECTs whose LIMIT may be handed to an index lookup: a single
/// iterator, and at most one ORDER BY key. Whether an index is actually used is
/// decided per run.
pub struct LimitEligibility;

impl CompilePass for LimitEligibility {
    fn apply(&self, query: &mut CompiledQuery, id: NodeId) -> Result<()> {
        if let CompiledValue::Select(select) = query.node_mut(id) {
            select.plan.limit_pushdown_eligible = select.limit.is_some()
                && select.iterators.len() == 1
                && select.order_by.len() <= 1;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "limit_eligibility"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;

    fn eligible(text: &str) -> bool {
        let mut q = parse_query(text).unwrap();
        let root = q.root();
        LimitEligibility.apply(&mut q, root).unwrap();
        q.root_select().unwrap().plan.limit_pushdown_eligible
    }

    #[test]
    fn test_eligibility() {
        assert!(eligible("SELECT * FROM /R p WHERE p.ID > 1 LIMIT 3"));
        assert!(eligible("SELECT * FROM /R p ORDER BY p.ID LIMIT 3"));
        assert!(!eligible("SELECT * FROM /R p ORDER BY p.ID, p.status LIMIT 3"));
        assert!(!eligible("SELECT * FROM /R p, /S q LIMIT 3"));
        assert!(!eligible("SELECT * FROM /R p"));
    }
}

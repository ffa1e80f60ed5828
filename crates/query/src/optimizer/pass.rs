//! Compile pass trait.

use crate::ast::{CompiledQuery, NodeId};
use crate::error::Result;

/// A compile-time pass over one SELECT of a compiled query.
///
/// Passes rewrite the SELECT in place or attach analysis to its `SelectPlan`;
/// a pass that rejects the query returns `QueryError::InvalidQuery`.
pub trait CompilePass {
    /// Applies the pass to the SELECT node `select`.
    fn apply(&self, query: &mut CompiledQuery, select: NodeId) -> Result<()>;

    /// Returns the name of this pass.
    fn name(&self) -> &'static str {
        "unnamed"
    }
}

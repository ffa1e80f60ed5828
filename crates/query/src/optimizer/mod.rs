//! Compile-time transformation of parsed queries.
//!
//! Every SELECT of a freshly parsed query goes through the passes in order:
//! - `GroupByRewrite`: GROUP BY becomes DISTINCT with a matching ORDER BY
//! - `OrderByAnalysis`: maps ORDER BY keys onto the projection
//! - `LimitEligibility`: decides whether a LIMIT may be handed to an index

mod group_by;
mod limit;
mod order_by;
mod pass;

pub use group_by::GroupByRewrite;
pub use limit::LimitEligibility;
pub use order_by::OrderByAnalysis;
pub use pass::CompilePass;

use crate::ast::CompiledQuery;
use crate::error::Result;
use crate::parser::parse_query;

/// Parses and transforms a query.
pub fn compile(text: &str) -> Result<CompiledQuery> {
    let mut query = parse_query(text)?;
    transform(&mut query)?;
    Ok(query)
}

/// Runs the compile passes over every SELECT of `query`.
pub fn transform(query: &mut CompiledQuery) -> Result<()> {
    let passes: [&dyn CompilePass; 3] = [&GroupByRewrite, &OrderByAnalysis, &LimitEligibility];
    for select in query.select_ids() {
        for pass in passes {
            pass.apply(query, select)?;
            tracing::trace!(pass = pass.name(), select = select.index(), "applied compile pass");
        }
    }
    Ok(())
}

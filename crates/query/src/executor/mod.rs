//! Query execution.
//!
//! A run first resolves names and dependencies over the whole compiled tree,
//! then evaluates the root. SELECTs run as nested loops over their FROM
//! iterators, narrowed by index lookups or direct key fetches when the WHERE
//! clause allows it.

mod bulk;
mod compare;
mod dependencies;
mod evaluate;
mod filter;
mod select;

pub(crate) use filter::PlanInfo;

//! Planning for federated conjunctive queries.
//!
//! Planning starts from the verdicts of the sources, which the [agglutinator] turns into leaves.
//! The [conjunctive] planner combines the leaves into join trees ordered by a
//! [join_order::JoinOrderPlanner], and [filter_placement] moves the filters of the query toward
//! the leaves. The [FederationPlanner] runs the whole pipeline.

pub mod agglutinator;
pub mod cardinality;
pub mod conjunctive;
mod context;
pub mod filter_placement;
pub mod join_graph;
pub mod join_order;
mod op;
mod planner;
mod source;
#[cfg(test)]
mod test_utils;

pub use context::PlanContext;
pub use op::{JoinType, Op, OpKind};
pub use planner::FederationPlanner;
pub use source::{Source, SubPlanEndpoint};

//! Executes federated query plans.
//!
//! The [PlanExecutor] turns a plan into a tree of pull-based [results] streams. Unions are
//! consumed through a [ResultsExecutor], which either concatenates the children or pulls them
//! concurrently.

mod executor;
mod multiplex;
mod pushdown;
pub mod results;
#[cfg(test)]
mod test_utils;

pub use executor::PlanExecutor;
pub use multiplex::{BufferedResultsExecutor, ResultsExecutor, SequentialResultsExecutor};

//! Combinators over [Results](fedfusion_common::Results) streams.

mod bind_join;
mod buffered;
mod cartesian;
mod concat;
mod fail_safe;
mod hash_join;
mod modifiers;

pub use bind_join::BindJoinResults;
pub use buffered::BufferedResults;
pub use cartesian::CartesianResults;
pub use concat::ConcatResults;
pub use fail_safe::FailSafeResults;
pub use hash_join::HashJoinResults;
pub use modifiers::{apply_modifiers, DistinctResults, FilterResults, LimitResults, ProjectResults};

use fedfusion_model::Variable;

/// Returns the variables of `lhs` followed by those of `rhs` that `lhs` does not contain.
pub fn merge_var_names(lhs: &[Variable], rhs: &[Variable]) -> Vec<Variable> {
    let mut result = lhs.to_vec();
    for variable in rhs {
        if !result.contains(variable) {
            result.push(variable.clone());
        }
    }
    result
}

use std::fmt::{Display, Formatter};

/// A feature an [Endpoint](crate::Endpoint) may support.
///
/// An endpoint *has* a capability if it can answer fragments that use it at all (possibly by
/// evaluating it locally after fetching). It has a *remote* capability if the source itself
/// evaluates the feature, which allows the executor to push the corresponding modifier down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Answering boolean (existence) queries.
    Ask,
    /// Evaluating filters.
    Filter,
    /// Evaluating projections.
    Projection,
    /// Removing duplicates.
    Distinct,
    /// Evaluating `LIMIT`.
    Limit,
    /// Answering fragments whose triples do not share variables.
    Cartesian,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Ask,
        Capability::Filter,
        Capability::Projection,
        Capability::Distinct,
        Capability::Limit,
        Capability::Cartesian,
    ];
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Ask => "ask",
            Capability::Filter => "filter",
            Capability::Projection => "projection",
            Capability::Distinct => "distinct",
            Capability::Limit => "limit",
            Capability::Cartesian => "cartesian",
        };
        f.write_str(name)
    }
}

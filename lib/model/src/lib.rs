mod cardinality;
mod error;
mod filter;
mod modifiers;
mod query;
mod solution;
pub mod universe;

pub use cardinality::*;
pub use error::*;
pub use filter::*;
pub use modifiers::*;
pub use query::*;
pub use solution::*;
pub use universe::{Subset, Universe, UniverseBuilder};

// Bitsets over universe ids.
pub use fixedbitset::FixedBitSet;

/// A set of variables of a query-scoped universe.
pub type VarSet = Subset<Variable>;
/// A set of triple patterns of a query-scoped universe.
pub type TripleSet = Subset<TriplePattern>;

// Re-export some oxrdf types.
pub use oxrdf::vocab;
pub use oxrdf::{
    BlankNode, BlankNodeRef, Literal, LiteralRef, NamedNode, NamedNodeRef, Term, TermRef, Triple,
    Variable, VariableRef,
};

// Re-export the spargebra types used to describe queries.
pub use spargebra::algebra::{Expression, Function};
pub use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

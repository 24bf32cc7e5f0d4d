//! Contains in-memory sources for [fedfusion](https://docs.rs/fedfusion/).
//!
//! A [MemSource] holds a set of triples and implements every boundary of a federation member:
//! it matches queries against its data, answers fragments, and evaluates whole sub-plans. Its
//! [MemSourceOptions] restrict the capabilities it advertises and inject faults, which makes it
//! the work horse of the federation tests.

mod index;
mod options;
mod source;

pub use index::{IndexComponent, TripleIndex};
pub use options::{Fault, MemSourceOptions};
pub use source::MemSource;

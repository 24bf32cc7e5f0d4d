#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! A federated conjunctive query engine.
//!
//! A [Federation] answers conjunctive graph-pattern queries over a set of registered sources. It
//! asks every source which parts of the query it can answer, combines the answers into a join
//! plan, and executes the plan as a tree of pull-based result streams.
//!
//! ```
//! use fedfusion::model::*;
//! use fedfusion::storage::MemSource;
//! use fedfusion::Federation;
//! use std::sync::Arc;
//!
//! let ex = |name: &str| NamedNode::new_unchecked(format!("http://example.com/{name}"));
//! let source = MemSource::new("people", [Triple::new(ex("alice"), ex("knows"), ex("bob"))]);
//!
//! let mut federation = Federation::default();
//! federation.register_source(Arc::new(source).into_source())?;
//!
//! let query = ConjunctiveQuery::new([TriplePattern {
//!     subject: Variable::new_unchecked("x").into(),
//!     predicate: ex("knows").into(),
//!     object: ex("bob").into(),
//! }]);
//! let solutions = fedfusion::common::drain(federation.query(&query)?)?;
//! assert_eq!(solutions.len(), 1);
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```

mod federation;

pub use federation::Federation;

pub mod model {
    pub use fedfusion_model::*;
}

pub mod common {
    pub use fedfusion_common::*;
}

pub mod logical {
    pub use fedfusion_logical::*;
}

pub mod execution {
    pub use fedfusion_physical::*;
}

pub mod storage {
    pub use fedfusion_storage::*;
}

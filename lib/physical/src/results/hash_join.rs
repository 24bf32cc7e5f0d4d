use crate::results::merge_var_names;
use fedfusion_common::{BoxedResults, FedResult, FederationError, Results};
use fedfusion_model::{Cardinality, Solution, Term, Variable};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Joins two streams by hashing one of them on the shared variables and looking up the
/// solutions of the other one in the table.
///
/// The build stream is materialized on the first call to [Results::has_next]. Build solutions
/// that do not bind all shared variables are kept aside and checked against every streamed
/// solution. For a left-outer join the right stream is always the build side, and left solutions
/// without a partner are produced unchanged.
pub struct HashJoinResults {
    stream: BoxedResults,
    build: Option<BoxedResults>,
    keys: Vec<Variable>,
    table: FxHashMap<Vec<Term>, Vec<Solution>>,
    unkeyed: Vec<Solution>,
    left_outer: bool,
    output: VecDeque<Solution>,
    var_names: Vec<Variable>,
    optional: bool,
    closed: bool,
}

impl HashJoinResults {
    /// Creates a new [HashJoinResults] that joins on the variables in `keys` and builds on
    /// `right`.
    pub fn new(left: BoxedResults, right: BoxedResults, keys: Vec<Variable>, left_outer: bool) -> Self {
        let var_names = merge_var_names(left.var_names(), right.var_names());
        Self::with_sides(left, right, keys, left_outer, var_names)
    }

    /// Creates an inner [HashJoinResults] that builds on `left` and streams `right`.
    pub fn build_left(left: BoxedResults, right: BoxedResults, keys: Vec<Variable>) -> Self {
        let var_names = merge_var_names(left.var_names(), right.var_names());
        Self::with_sides(right, left, keys, false, var_names)
    }

    fn with_sides(
        stream: BoxedResults,
        build: BoxedResults,
        keys: Vec<Variable>,
        left_outer: bool,
        var_names: Vec<Variable>,
    ) -> Self {
        Self {
            stream,
            build: Some(build),
            keys,
            table: FxHashMap::default(),
            unkeyed: Vec::new(),
            left_outer,
            output: VecDeque::new(),
            var_names,
            optional: false,
            closed: false,
        }
    }

    fn build_table(&mut self) -> FedResult<()> {
        let Some(mut build) = self.build.take() else {
            return Ok(());
        };
        let pulled = self.insert_all(build.as_mut());
        let closed = build.close();
        pulled.and(closed)
    }

    fn insert_all(&mut self, build: &mut dyn Results) -> FedResult<()> {
        while build.has_next()? {
            let solution = build.next()?;
            match solution.key(&self.keys) {
                Some(key) => self.table.entry(key).or_default().push(solution),
                None => self.unkeyed.push(solution),
            }
        }
        Ok(())
    }

    fn join_one(&mut self, left: &Solution) {
        let before = self.output.len();
        match left.key(&self.keys) {
            Some(key) => {
                let candidates = self.table.get(&key).into_iter().flatten();
                self.output.extend(
                    candidates
                        .chain(&self.unkeyed)
                        .filter_map(|right| left.merge(right)),
                );
            }
            None => {
                let candidates = self.table.values().flatten();
                self.output.extend(
                    candidates
                        .chain(&self.unkeyed)
                        .filter_map(|right| left.merge(right)),
                );
            }
        }
        if self.left_outer && self.output.len() == before {
            self.output.push_back(left.clone());
        }
    }
}

impl Results for HashJoinResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        let build = match &self.build {
            Some(build) => build.cardinality(),
            None => {
                let size = self.table.values().map(Vec::len).sum::<usize>() + self.unkeyed.len();
                Cardinality::exact(size as u64)
            }
        };
        self.stream
            .cardinality()
            .multiply(build)
            .at_most()
            .add(Cardinality::exact(self.output.len() as u64))
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if !self.output.is_empty() {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }
        self.build_table()?;
        while self.stream.has_next()? {
            let left = self.stream.next()?;
            self.join_one(&left);
            if !self.output.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.has_next()?;
        self.output.pop_front().ok_or(FederationError::NoSuchElement)
    }

    fn close(&mut self) -> FedResult<()> {
        self.output.clear();
        self.table.clear();
        self.unkeyed.clear();
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let stream = self.stream.close();
        let build = match self.build.take() {
            Some(mut build) => build.close(),
            None => Ok(()),
        };
        stream.and(build)
    }
}

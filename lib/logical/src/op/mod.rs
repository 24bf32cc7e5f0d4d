//! Plan nodes.
//!
//! A plan is a tree of immutable [Op] nodes shared through [Arc]. Every node carries the set of
//! query triples it answers, the variables it binds, and its input interface, all as subsets of
//! the universes of one [PlanContext]. Rewrites always build new nodes, hence the cached
//! cardinality of a node never goes stale.

mod display;

use crate::{PlanContext, Source};
use fedfusion_model::{
    Cardinality, ConjunctiveQuery, Filter, Modifiers, TriplePattern, TripleSet, VarSet, Variable,
};
use std::sync::{Arc, OnceLock};

/// The join semantics of a [OpKind::Join].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    /// The right side is optional.
    Left,
}

/// The kind of a plan node.
#[derive(Debug)]
pub enum OpKind {
    /// A fragment bound to the source that answers it.
    Endpoint {
        source: Source,
        query: ConjunctiveQuery,
    },
    /// A fragment that has not been decomposed yet. Cannot be executed.
    Query { query: ConjunctiveQuery },
    /// Produces no solutions.
    Empty,
    /// The set union of alternatives that answer the same triples.
    Union(Vec<Arc<Op>>),
    /// The product of operands that do not share variables.
    Cartesian(Vec<Arc<Op>>),
    /// A join of two operands. If the right operand is optional, this is a left join.
    Join { left: Arc<Op>, right: Arc<Op> },
    /// Applies the node's modifiers to its single child.
    Pipe(Arc<Op>),
}

/// A node of a federated query plan.
#[derive(Debug)]
pub struct Op {
    kind: OpKind,
    matched_triples: TripleSet,
    result_vars: VarSet,
    required_inputs: VarSet,
    optional_inputs: VarSet,
    modifiers: Modifiers,
    cardinality: OnceLock<Cardinality>,
}

impl Op {
    /// Creates a leaf that sends `query` to `source`.
    ///
    /// The result variables are the variables of the query's triples. Inputs may also name
    /// variables that only occur in filters.
    pub fn endpoint(
        ctx: &PlanContext,
        source: Source,
        query: ConjunctiveQuery,
        required_inputs: &[Variable],
        optional_inputs: &[Variable],
    ) -> Self {
        let required_inputs = ctx.var_set(required_inputs);
        let optional_inputs = ctx.var_set(optional_inputs).difference(&required_inputs);
        Self::new(
            ctx.triple_set(query.triples()),
            ctx.vars_of_triples(query.triples()),
            required_inputs,
            optional_inputs,
            Modifiers::default(),
            OpKind::Endpoint { source, query },
        )
    }

    /// Creates an unresolved leaf for `query`.
    pub fn query(ctx: &PlanContext, query: ConjunctiveQuery) -> Self {
        Self::new(
            ctx.triple_set(query.triples()),
            ctx.vars_of_triples(query.triples()),
            ctx.variables().empty_subset(),
            ctx.variables().empty_subset(),
            Modifiers::default(),
            OpKind::Query { query },
        )
    }

    /// Creates an empty node that still declares the variables and triples it stands for.
    pub fn empty(ctx: &PlanContext, triples: &[TriplePattern]) -> Self {
        Self::new(
            ctx.triple_set(triples),
            ctx.vars_of_triples(triples),
            ctx.variables().empty_subset(),
            ctx.variables().empty_subset(),
            Modifiers::default(),
            OpKind::Empty,
        )
    }

    /// Creates a union of `children`. A single child is returned as is.
    pub fn union(ctx: &PlanContext, mut children: Vec<Arc<Op>>) -> Arc<Op> {
        if children.len() == 1 {
            return children.remove(0);
        }
        Arc::new(Self::combine(ctx, children, OpKind::Union))
    }

    /// Creates a cartesian product of `children`. A single child is returned as is.
    pub fn cartesian(ctx: &PlanContext, mut children: Vec<Arc<Op>>) -> Arc<Op> {
        if children.len() == 1 {
            return children.remove(0);
        }
        Arc::new(Self::combine(ctx, children, OpKind::Cartesian))
    }

    /// Joins `left` and `right`. Required inputs of `right` that `left` binds are resolved.
    pub fn join(left: Arc<Op>, right: Arc<Op>) -> Op {
        let required_inputs = left
            .required_inputs
            .union(&right.required_inputs.difference(&left.result_vars));
        let optional_inputs = left
            .optional_inputs
            .union(&right.optional_inputs.difference(&left.result_vars))
            .difference(&required_inputs);
        Self::new(
            left.matched_triples.union(&right.matched_triples),
            left.result_vars.union(&right.result_vars),
            required_inputs,
            optional_inputs,
            Modifiers::default(),
            OpKind::Join { left, right },
        )
    }

    /// Wraps `child` in a node that applies `modifiers`.
    pub fn pipe(child: Arc<Op>, modifiers: Modifiers) -> Op {
        let mut result_vars = child.result_vars.clone();
        if let Some(projection) = modifiers.projection() {
            let universe = Arc::clone(result_vars.universe());
            result_vars.intersect_with(&universe.subset(projection));
        }
        Self::new(
            child.matched_triples.clone(),
            result_vars,
            child.required_inputs.clone(),
            child.optional_inputs.clone(),
            modifiers,
            OpKind::Pipe(child),
        )
    }

    fn combine(ctx: &PlanContext, children: Vec<Arc<Op>>, kind: fn(Vec<Arc<Op>>) -> OpKind) -> Op {
        let mut matched_triples = ctx.triples().empty_subset();
        let mut result_vars = ctx.variables().empty_subset();
        let mut required_inputs = ctx.variables().empty_subset();
        let mut optional_inputs = ctx.variables().empty_subset();
        for child in &children {
            matched_triples.union_with(&child.matched_triples);
            result_vars.union_with(&child.result_vars);
            required_inputs.union_with(&child.required_inputs);
            optional_inputs.union_with(&child.optional_inputs);
        }
        optional_inputs.difference_with(&required_inputs);
        Self::new(
            matched_triples,
            result_vars,
            required_inputs,
            optional_inputs,
            Modifiers::default(),
            kind(children),
        )
    }

    fn new(
        matched_triples: TripleSet,
        result_vars: VarSet,
        required_inputs: VarSet,
        optional_inputs: VarSet,
        modifiers: Modifiers,
        kind: OpKind,
    ) -> Self {
        Self {
            kind,
            matched_triples,
            result_vars,
            required_inputs,
            optional_inputs,
            modifiers,
            cardinality: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn matched_triples(&self) -> &TripleSet {
        &self.matched_triples
    }

    pub fn result_vars(&self) -> &VarSet {
        &self.result_vars
    }

    pub fn required_inputs(&self) -> &VarSet {
        &self.required_inputs
    }

    pub fn optional_inputs(&self) -> &VarSet {
        &self.optional_inputs
    }

    /// Returns the required and optional inputs.
    pub fn inputs(&self) -> VarSet {
        self.required_inputs.union(&self.optional_inputs)
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn filters(&self) -> &[Filter] {
        self.modifiers.filters()
    }

    /// Returns whether this node is the optional side of a left join.
    pub fn is_optional(&self) -> bool {
        self.modifiers.is_optional()
    }

    pub fn is_empty_op(&self) -> bool {
        matches!(self.kind, OpKind::Empty)
    }

    /// Returns the join semantics if this node is a join.
    pub fn join_type(&self) -> Option<JoinType> {
        match &self.kind {
            OpKind::Join { right, .. } if right.is_optional() => Some(JoinType::Left),
            OpKind::Join { .. } => Some(JoinType::Inner),
            _ => None,
        }
    }

    /// Returns the direct children of this node.
    pub fn children(&self) -> Vec<&Arc<Op>> {
        match &self.kind {
            OpKind::Endpoint { .. } | OpKind::Query { .. } | OpKind::Empty => Vec::new(),
            OpKind::Union(children) | OpKind::Cartesian(children) => children.iter().collect(),
            OpKind::Join { left, right } => vec![left, right],
            OpKind::Pipe(child) => vec![child],
        }
    }

    /// Returns whether evaluating this sub-plan needs values for variables it does not bind
    /// itself, either because of required inputs or because a filter mentions such a variable.
    pub fn needs_bindings(&self) -> bool {
        !self.required_inputs.is_empty() || self.references_outside(&self.result_vars)
    }

    fn references_outside(&self, bound: &VarSet) -> bool {
        let filters_outside = self.filters().iter().any(|filter| {
            filter
                .variables()
                .iter()
                .any(|variable| !bound.contains(variable))
        });
        filters_outside
            || self
                .children()
                .into_iter()
                .any(|child| child.references_outside(bound))
    }

    /// Returns the source every leaf of this sub-plan is bound to, if there is exactly one.
    pub fn bound_source(&self) -> Option<&Source> {
        match &self.kind {
            OpKind::Endpoint { source, .. } => Some(source),
            OpKind::Query { .. } | OpKind::Empty => None,
            _ => {
                let mut sources = self.children().into_iter().map(|child| child.bound_source());
                let first = sources.next()??;
                sources
                    .all(|source| source == Some(first))
                    .then_some(first)
            }
        }
    }

    /// Returns a copy of this node with other modifiers.
    pub fn with_modifiers(&self, modifiers: Modifiers) -> Op {
        let mut result_vars = self.result_vars.clone();
        if let (OpKind::Pipe(child), Some(projection)) = (&self.kind, modifiers.projection()) {
            result_vars = child.result_vars.clone();
            let universe = Arc::clone(result_vars.universe());
            result_vars.intersect_with(&universe.subset(projection));
        }
        Self::new(
            self.matched_triples.clone(),
            result_vars,
            self.required_inputs.clone(),
            self.optional_inputs.clone(),
            modifiers,
            self.kind.shallow_clone(),
        )
    }

    /// Returns a copy of this node with additional `filters`.
    pub fn with_filters(&self, filters: impl IntoIterator<Item = Filter>) -> Op {
        self.with_modifiers(self.modifiers.clone().with_filters(filters))
    }

    /// Returns a copy of this node marked as optional (or not).
    pub fn with_optional(&self, optional: bool) -> Op {
        self.with_modifiers(self.modifiers.clone().with_optional(optional))
    }

    /// Returns a copy of this inner node with new children. The sets are recomputed from the
    /// children while the modifiers are kept. Leaves are copied as is.
    pub fn with_children(&self, ctx: &PlanContext, mut children: Vec<Arc<Op>>) -> Op {
        let op = match &self.kind {
            OpKind::Endpoint { .. } | OpKind::Query { .. } | OpKind::Empty => {
                return self.with_modifiers(self.modifiers.clone());
            }
            OpKind::Union(_) => Self::combine(ctx, children, OpKind::Union),
            OpKind::Cartesian(_) => Self::combine(ctx, children, OpKind::Cartesian),
            OpKind::Join { .. } => {
                debug_assert_eq!(children.len(), 2, "A join has two children");
                let right = children.remove(1);
                let left = children.remove(0);
                Self::join(left, right)
            }
            OpKind::Pipe(_) => {
                debug_assert_eq!(children.len(), 1, "A pipe has one child");
                Self::pipe(children.remove(0), Modifiers::default())
            }
        };
        op.with_modifiers(self.modifiers.clone())
    }

    /// Returns the cached cardinality estimate.
    pub fn cached_cardinality(&self) -> Option<Cardinality> {
        self.cardinality.get().copied()
    }

    /// Returns the cached cardinality estimate or computes and caches it.
    pub fn cardinality_or_init(&self, estimate: impl FnOnce() -> Cardinality) -> Cardinality {
        *self.cardinality.get_or_init(estimate)
    }

    /// Iterates the leaves of this sub-plan in depth-first order.
    pub fn leaves(&self) -> Vec<&Op> {
        let mut result = Vec::new();
        self.collect_leaves(&mut result);
        result
    }

    fn collect_leaves<'a>(&'a self, result: &mut Vec<&'a Op>) {
        let children = self.children();
        if children.is_empty() {
            result.push(self);
        }
        for child in children {
            child.collect_leaves(result);
        }
    }
}

impl OpKind {
    fn shallow_clone(&self) -> OpKind {
        match self {
            OpKind::Endpoint { source, query } => OpKind::Endpoint {
                source: source.clone(),
                query: query.clone(),
            },
            OpKind::Query { query } => OpKind::Query {
                query: query.clone(),
            },
            OpKind::Empty => OpKind::Empty,
            OpKind::Union(children) => OpKind::Union(children.clone()),
            OpKind::Cartesian(children) => OpKind::Cartesian(children.clone()),
            OpKind::Join { left, right } => OpKind::Join {
                left: Arc::clone(left),
                right: Arc::clone(right),
            },
            OpKind::Pipe(child) => OpKind::Pipe(Arc::clone(child)),
        }
    }
}

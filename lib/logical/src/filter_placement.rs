//! Moves filters as close to the leaves as their variables allow.
//!
//! Filters are split into their top-level conjuncts first. A conjunct whose variables are all
//! bound by one child moves into that child. A conjunct that also needs values the child can only
//! receive as inputs is a join component and moves into the child whose input interface fits
//! best. Everything else stays where it is.

use crate::{Op, OpKind, PlanContext};
use fedfusion_common::Capability;
use fedfusion_model::{Filter, VarSet};
use std::cmp::Reverse;
use std::sync::Arc;

/// Places the filters of `op` and all its descendants.
pub fn place_filters(ctx: &PlanContext, op: &Arc<Op>) -> Arc<Op> {
    let children = op.children();
    if children.is_empty() {
        return Arc::clone(op);
    }

    let mut assigned: Vec<Vec<Filter>> = vec![Vec::new(); children.len()];
    let mut remaining = Vec::new();
    for conjunct in op.filters().iter().flat_map(Filter::conjuncts) {
        if let Some(targets) = push_down_targets(op, &children, &conjunct) {
            for idx in targets {
                assigned[idx].push(conjunct.clone());
            }
        } else if let Some(idx) = join_component_target(op, &children, &conjunct, &assigned) {
            tracing::debug!("Placing join component {conjunct} into child {idx}");
            assigned[idx].push(conjunct);
        } else {
            remaining.push(conjunct);
        }
    }

    let children = children
        .into_iter()
        .zip(assigned)
        .map(|(child, filters)| {
            if filters.is_empty() {
                place_filters(ctx, child)
            } else {
                place_filters(ctx, &Arc::new(child.with_filters(filters)))
            }
        })
        .collect();
    Arc::new(
        op.with_children(ctx, children)
            .with_modifiers(op.modifiers().clone().with_replaced_filters(remaining)),
    )
}

/// Returns the children a conjunct can move into because they bind all of its variables.
fn push_down_targets(op: &Op, children: &[&Arc<Op>], conjunct: &Filter) -> Option<Vec<usize>> {
    let fits = |child: &Op| {
        !child.is_optional()
            && conjunct
                .variables()
                .iter()
                .all(|variable| child.result_vars().contains(variable))
    };
    match op.kind() {
        OpKind::Union(_) => children
            .iter()
            .all(|child| fits(child))
            .then(|| (0..children.len()).collect()),
        OpKind::Pipe(_) => (op.modifiers().limit().is_none() && children.iter().all(|c| fits(c)))
            .then(|| vec![0]),
        OpKind::Join { .. } | OpKind::Cartesian(_) => children
            .iter()
            .position(|child| fits(child))
            .map(|idx| vec![idx]),
        OpKind::Endpoint { .. } | OpKind::Query { .. } | OpKind::Empty => None,
    }
}

/// Returns whether `conjunct` joins the results of `child` with values it receives as inputs.
///
/// Every sub-clause touching variables must mention a result of the child, at least one variable
/// must be an input that the child does not bind itself, and all variables must be reachable.
pub fn is_join_component(conjunct: &Filter, child: &Op) -> bool {
    let results = child.result_vars();
    let inputs = child.inputs();
    let clauses_touch_results = conjunct.sub_clauses().iter().all(|clause| {
        clause.variables().is_empty()
            || clause
                .variables()
                .iter()
                .any(|variable| results.contains(variable))
    });
    let needs_input = conjunct
        .variables()
        .iter()
        .any(|variable| inputs.contains(variable) && !results.contains(variable));
    let reachable = conjunct
        .variables()
        .iter()
        .all(|variable| results.contains(variable) || inputs.contains(variable));
    clauses_touch_results && needs_input && reachable
}

fn join_component_target(
    op: &Op,
    children: &[&Arc<Op>],
    conjunct: &Filter,
    assigned: &[Vec<Filter>],
) -> Option<usize> {
    if !matches!(op.kind(), OpKind::Join { .. } | OpKind::Cartesian(_)) {
        return None;
    }
    children
        .iter()
        .enumerate()
        .filter(|(idx, child)| {
            if child.is_optional() || !is_join_component(conjunct, child) {
                return false;
            }
            conjunct.variables().iter().all(|variable| {
                child.result_vars().contains(variable)
                    || children.iter().enumerate().all(|(other, sibling)| {
                        other == *idx
                            || sees_sibling(op, *idx, other)
                            || !sibling.result_vars().contains(variable)
                    })
            })
        })
        .min_by_key(|(idx, child)| (priority(child, !assigned[*idx].is_empty()), Reverse(*idx)))
        .map(|(idx, _)| idx)
}

/// Returns whether the child at `idx` receives the bindings of the child at `sibling`.
///
/// Only the right side of a join is evaluated with the bindings of the left side. The operands
/// of a cartesian product are evaluated independently.
fn sees_sibling(op: &Op, idx: usize, sibling: usize) -> bool {
    matches!(op.kind(), OpKind::Join { .. }) && idx == 1 && sibling == 0
}

/// Ranks a candidate for a join component. Lower is better.
fn priority(child: &Op, rewritten: bool) -> u8 {
    let remote_filter = child
        .bound_source()
        .is_some_and(|source| source.endpoint().has_remote_capability(Capability::Filter));
    let has_required = !child.required_inputs().is_empty();
    let has_optional = !child.optional_inputs().is_empty();
    if rewritten {
        0
    } else if remote_filter && has_required {
        1
    } else if has_required {
        2
    } else if remote_filter && has_optional {
        3
    } else if has_optional {
        4
    } else {
        5
    }
}

/// Drops filters that cannot be evaluated where they are placed.
///
/// A filter must only mention variables the node binds or receives as inputs, and it must not be
/// determined by the required inputs alone.
pub fn sanitize_filters(ctx: &PlanContext, op: &Arc<Op>) -> Arc<Op> {
    let old_children = op.children();
    let children = old_children
        .iter()
        .map(|child| sanitize_filters(ctx, child))
        .collect::<Vec<_>>();
    let children_changed = old_children
        .iter()
        .zip(&children)
        .any(|(old, new)| !Arc::ptr_eq(old, new));

    let evaluable = evaluable_vars(op);
    let (kept, dropped): (Vec<_>, Vec<_>) = op
        .filters()
        .iter()
        .cloned()
        .partition(|filter| is_evaluable(filter, &evaluable, op.required_inputs()));
    for filter in &dropped {
        tracing::warn!("Dropping filter {filter} that cannot be evaluated at its plan node");
    }

    if dropped.is_empty() && !children_changed {
        return Arc::clone(op);
    }
    let modifiers = op.modifiers().clone().with_replaced_filters(kept);
    if children.is_empty() {
        Arc::new(op.with_modifiers(modifiers))
    } else {
        Arc::new(op.with_children(ctx, children).with_modifiers(modifiers))
    }
}

fn evaluable_vars(op: &Op) -> VarSet {
    let results = match op.kind() {
        OpKind::Pipe(child) => child.result_vars(),
        _ => op.result_vars(),
    };
    results.union(&op.inputs())
}

fn is_evaluable(filter: &Filter, evaluable: &VarSet, required: &VarSet) -> bool {
    let variables = filter.variables();
    variables.iter().all(|variable| evaluable.contains(variable))
        && (variables.is_empty() || !variables.iter().all(|variable| required.contains(variable)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{filtering_source, leaf, source, triple, var};
    use fedfusion_model::{ConjunctiveQuery, Expression, Modifiers};
    use insta::assert_snapshot;

    fn less(a: &str, b: &str) -> Filter {
        Filter::new(Expression::Less(
            Box::new(Expression::Variable(var(a))),
            Box::new(Expression::Variable(var(b))),
        ))
    }

    fn and(a: Filter, b: Filter) -> Filter {
        Filter::new(Expression::And(
            Box::new(a.expression().clone()),
            Box::new(b.expression().clone()),
        ))
    }

    #[test]
    fn conjuncts_move_into_the_child_binding_them() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "age", "?a")]);
        let ctx = PlanContext::new(&query);
        let join = Op::join(
            leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &[]),
            leaf(&ctx, &source("b"), &[query.triples()[1].clone()], &[]),
        )
        .with_filters([and(less("x", "y"), less("a", "x"))]);

        let placed = place_filters(&ctx, &Arc::new(join));

        assert_snapshot!(placed, @r"
        Join: Inner [filter: (?a < ?x)]
          Endpoint(a): ?x <http://example.com/knows> ?y [filter: (?x < ?y)]
          Endpoint(b): ?y <http://example.com/age> ?a
        ");
    }

    #[test]
    fn conjuncts_move_into_every_alternative_of_a_union() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y")]);
        let ctx = PlanContext::new(&query);
        let union = Op::union(
            &ctx,
            vec![
                leaf(&ctx, &source("a"), query.triples(), &[]),
                leaf(&ctx, &source("b"), query.triples(), &[]),
            ],
        )
        .with_filters([less("x", "y")]);

        let placed = place_filters(&ctx, &Arc::new(union));

        assert_snapshot!(placed, @r"
        Union
          Endpoint(a): ?x <http://example.com/knows> ?y [filter: (?x < ?y)]
          Endpoint(b): ?x <http://example.com/knows> ?y [filter: (?x < ?y)]
        ");
    }

    #[test]
    fn join_components_move_into_the_child_receiving_inputs() {
        let query = ConjunctiveQuery::new([
            triple("?x", "age", "?b"),
            triple("?x", "knows", "?y"),
            triple("?y", "age", "?a"),
        ]);
        let ctx = PlanContext::new(&query);
        let left = leaf(&ctx, &source("a"), &query.triples()[..2], &[]);
        let right = Arc::new(Op::endpoint(
            &ctx,
            filtering_source("b"),
            ConjunctiveQuery::new([query.triples()[2].clone()]),
            &[],
            &[var("b")],
        ));
        let join = Op::join(left, right).with_filters([less("a", "b")]);

        let placed = place_filters(&ctx, &Arc::new(join));

        assert_snapshot!(placed, @r"
        Join: Inner
          Endpoint(a): ?x <http://example.com/age> ?b . ?x <http://example.com/knows> ?y
          Endpoint(b): ?y <http://example.com/age> ?a (optional: ?b) [filter: (?a < ?b)]
        ");
        let OpKind::Join { right, .. } = placed.kind() else {
            panic!("Expected a join");
        };
        assert!(right.needs_bindings(), "The right side must run as a bind join");
    }

    #[test]
    fn optional_children_keep_their_filters_outside() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "age", "?a")]);
        let ctx = PlanContext::new(&query);
        let optional = leaf(&ctx, &source("b"), &[query.triples()[1].clone()], &[]);
        let join = Op::join(
            leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &[]),
            Arc::new(optional.with_optional(true)),
        )
        .with_filters([less("a", "y")]);

        let placed = place_filters(&ctx, &Arc::new(join));

        assert_snapshot!(placed, @r"
        Join: Left [filter: (?a < ?y)]
          Endpoint(a): ?x <http://example.com/knows> ?y
          Endpoint(b): ?y <http://example.com/age> ?a [optional]
        ");
    }

    #[test]
    fn limited_pipes_keep_their_filters() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y")]);
        let ctx = PlanContext::new(&query);
        let pipe = Op::pipe(
            leaf(&ctx, &source("a"), query.triples(), &[]),
            Modifiers::new()
                .with_limit(Some(1))
                .with_filter(less("x", "y")),
        );

        let placed = place_filters(&ctx, &Arc::new(pipe));

        assert_snapshot!(placed, @r"
        Pipe [filter: (?x < ?y); limit: 1]
          Endpoint(a): ?x <http://example.com/knows> ?y
        ");
    }

    #[test]
    fn sanitize_drops_unreachable_and_input_determined_filters() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y")]);
        let ctx = PlanContext::with_optionals(
            &query,
            &[ConjunctiveQuery::new([triple("?z", "age", "?w")])],
        );
        let node = leaf(&ctx, &source("a"), query.triples(), &["x"])
            .with_filters([less("x", "y"), less("x", "z"), less("x", "x")]);

        let sanitized = sanitize_filters(&ctx, &Arc::new(node));

        assert_snapshot!(sanitized, @"Endpoint(a): ?x <http://example.com/knows> ?y (required: ?x) [filter: (?x < ?y)]");
    }

    #[test]
    fn join_components_move_into_operands_of_a_cartesian_product() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?z", "age", "?w")]);
        let ctx = PlanContext::with_optionals(
            &query,
            &[ConjunctiveQuery::new([triple("?b", "name", "?n")])],
        );
        let first = leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &[]);
        let second = Arc::new(Op::endpoint(
            &ctx,
            filtering_source("b"),
            ConjunctiveQuery::new([query.triples()[1].clone()]),
            &[],
            &[var("b")],
        ));
        let product = Op::cartesian(&ctx, vec![first, second])
            .with_filters([and(less("w", "b"), less("w", "y"))]);

        let placed = place_filters(&ctx, &Arc::new(product));

        assert_snapshot!(placed, @r"
        Cartesian [filter: (?w < ?y)]
          Endpoint(a): ?x <http://example.com/knows> ?y
          Endpoint(b): ?z <http://example.com/age> ?w (optional: ?b) [filter: (?w < ?b)]
        ");
    }
}

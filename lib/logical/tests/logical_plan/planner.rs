use crate::test_utils::{create_planner, triple, PredicateSource};
use fedfusion_common::FedResult;
use fedfusion_logical::agglutinator::{Agglutinator, MatchingOptions, StandardAgglutinator};
use fedfusion_logical::PlanContext;
use fedfusion_model::{ConjunctiveQuery, Modifiers};

#[test]
fn test_plan_chain_over_two_sources() -> FedResult<()> {
    let query = ConjunctiveQuery::new([
        triple("?x", "knows", "?y"),
        triple("?y", "name", "?n"),
        triple("?y", "age", "?a"),
    ]);
    let sources = [
        PredicateSource::new("people", &["knows", "name"]).into_source(),
        PredicateSource::new("stats", &["age"]).into_source(),
    ];

    let plan = create_planner().plan(&query, &sources)?;

    insta::assert_snapshot!(plan, @r"
    Join: Inner
      Join: Inner
        Endpoint(people): ?y <http://example.com/name> ?n
        Endpoint(stats): ?y <http://example.com/age> ?a
      Endpoint(people): ?x <http://example.com/knows> ?y
    ");
    assert!(plan.required_inputs().is_empty());
    assert_eq!(plan.matched_triples().len(), query.len());

    Ok(())
}

#[test]
fn test_plan_exclusive_group_and_single_triples() -> FedResult<()> {
    let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "name", "?n")]);
    let sources = [
        PredicateSource::new("a", &["knows", "name"])
            .grouped()
            .into_source(),
        PredicateSource::new("b", &["knows", "name"]).into_source(),
    ];

    let plan = create_planner().plan(&query, &sources)?;

    insta::assert_snapshot!(plan, @r"
    Union
      Join: Inner
        Endpoint(b): ?x <http://example.com/knows> ?y
        Endpoint(b): ?y <http://example.com/name> ?n
      Endpoint(a): ?x <http://example.com/knows> ?y . ?y <http://example.com/name> ?n
    ");

    Ok(())
}

#[test]
fn test_plan_disconnected_query() -> FedResult<()> {
    let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?z", "name", "?n")])
        .with_modifiers(Modifiers::new().with_distinct(true));
    let sources = [PredicateSource::new("people", &["knows", "name"]).into_source()];

    let plan = create_planner().plan(&query, &sources)?;

    insta::assert_snapshot!(plan, @r"
    Pipe [distinct]
      Cartesian
        Endpoint(people): ?x <http://example.com/knows> ?y
        Endpoint(people): ?z <http://example.com/name> ?n
    ");

    Ok(())
}

#[test]
fn test_leaves_cover_relevant_triples() -> FedResult<()> {
    let query = ConjunctiveQuery::new([
        triple("?x", "knows", "?y"),
        triple("?y", "name", "?n"),
        triple("?y", "age", "?a"),
        triple("?y", "email", "?e"),
    ]);
    let sources = [
        PredicateSource::new("a", &["knows", "name"])
            .grouped()
            .into_source(),
        PredicateSource::new("b", &["name", "age"]).into_source(),
        PredicateSource::new("c", &["knows"]).into_source(),
    ];
    let ctx = PlanContext::new(&query);
    let agglutinator = StandardAgglutinator;
    let state = agglutinator.create_state(&ctx);
    for source in &sources {
        let verdict = source
            .matcher()
            .match_query(&query, MatchingOptions::default().reasoning)?;
        state.add_match(source, verdict)?;
    }

    let relevant = state
        .source_verdicts()?
        .iter()
        .flat_map(|(_, verdict)| verdict.matched_triples().cloned().collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let mut expected = ctx.triples().empty_subset();
    for triple in &relevant {
        expected.insert(triple);
    }
    let mut covered = ctx.triples().empty_subset();
    for leaf in state.take_leaves()? {
        covered.union_with(leaf.matched_triples());
    }

    assert_eq!(covered, expected);
    assert_eq!(covered.len(), 3);

    Ok(())
}

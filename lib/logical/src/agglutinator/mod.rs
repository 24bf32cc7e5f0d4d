//! Agglutination turns per-source matching verdicts into the leaves of a plan.
//!
//! The protocol is: create a state for a query, feed it one verdict per source (in any order,
//! possibly concurrently), and take the leaves. Every fragment becomes one leaf bound to the
//! source that answers it. The [StandardAgglutinator] additionally merges fragments that several
//! sources answer into a single union.

mod parallel;
mod state;

use crate::{Op, PlanContext, Source};
use fedfusion_common::{FedResult, MatchingMode, ReasoningMode, SourceVerdict};
use fedfusion_model::ConjunctiveQuery;
pub use parallel::ParallelAgglutinator;
pub use state::FragmentCollector;
use std::fmt::Debug;
use std::sync::Arc;

/// Options for matching sources against a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MatchingOptions {
    pub reasoning: ReasoningMode,
    pub mode: MatchingMode,
}

/// Collects the verdicts of all sources for one query.
pub trait AgglutinationState: Debug + Send + Sync {
    /// Records the `verdict` of `source`. Safe to call concurrently.
    fn add_match(&self, source: &Source, verdict: SourceVerdict) -> FedResult<()>;

    /// Returns the recorded verdicts sorted by source name.
    fn source_verdicts(&self) -> FedResult<Vec<(Source, SourceVerdict)>>;

    /// Finalizes the state and returns the leaves. Fails if called more than once.
    fn take_leaves(&self) -> FedResult<Vec<Arc<Op>>>;
}

/// Builds plan leaves from source verdicts.
pub trait Agglutinator: Debug + Send + Sync {
    /// Creates an empty state for the query of `ctx`.
    fn create_state(&self, ctx: &Arc<PlanContext>) -> Arc<dyn AgglutinationState>;

    /// Matches every source against the query of `ctx` and returns the leaves.
    fn agglutinate(
        &self,
        ctx: &Arc<PlanContext>,
        sources: &[Source],
        options: MatchingOptions,
    ) -> FedResult<Vec<Arc<Op>>> {
        let state = self.create_state(ctx);
        for source in sources {
            if let Some(verdict) = match_source(ctx.query(), source, options) {
                state.add_match(source, verdict)?;
            }
        }
        state.take_leaves()
    }
}

/// Emits one leaf per source and fragment.
#[derive(Debug, Default)]
pub struct NaiveAgglutinator;

impl Agglutinator for NaiveAgglutinator {
    fn create_state(&self, ctx: &Arc<PlanContext>) -> Arc<dyn AgglutinationState> {
        Arc::new(FragmentCollector::new(Arc::clone(ctx), false))
    }
}

/// Emits one leaf per fragment, which is a union if several sources answer the fragment.
#[derive(Debug, Default)]
pub struct StandardAgglutinator;

impl Agglutinator for StandardAgglutinator {
    fn create_state(&self, ctx: &Arc<PlanContext>) -> Arc<dyn AgglutinationState> {
        Arc::new(FragmentCollector::new(Arc::clone(ctx), true))
    }
}

/// Matches `source` against `query`. Returns [None] if the source must be skipped.
pub(crate) fn match_source(
    query: &ConjunctiveQuery,
    source: &Source,
    options: MatchingOptions,
) -> Option<SourceVerdict> {
    let matcher = source.matcher();
    if !matcher.supports(options.reasoning) {
        tracing::warn!(
            "Skipping source {} as it does not support reasoning mode {:?}",
            source.name(),
            options.reasoning
        );
        return None;
    }

    match options.mode {
        MatchingMode::CacheOnly => {
            let verdict = matcher.cached_match(query, options.reasoning);
            if verdict.is_none() {
                tracing::debug!("No cached verdict for source {}", source.name());
            }
            verdict
        }
        MatchingMode::Full => match matcher.match_query(query, options.reasoning) {
            Ok(verdict) => Some(verdict),
            Err(error) => {
                tracing::warn!("Matching source {} failed: {error}", source.name());
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{source_with_verdict, triple, var};
    use fedfusion_common::{FederationError, Fragment, WorkerPool};
    use fedfusion_model::TriplePattern;
    use insta::assert_snapshot;
    use std::time::Duration;

    fn query() -> ConjunctiveQuery {
        ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "name", "?n")])
    }

    fn relevant(triples: &[TriplePattern]) -> SourceVerdict {
        triples.iter().fold(SourceVerdict::new(), |verdict, triple| {
            verdict.with_relevant(Fragment::single(triple.clone()))
        })
    }

    fn sources(query: &ConjunctiveQuery) -> Vec<Source> {
        vec![
            source_with_verdict("b", relevant(query.triples())),
            source_with_verdict("a", relevant(&query.triples()[..1])),
        ]
    }

    fn render(leaves: &[Arc<Op>]) -> String {
        leaves
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn standard_merges_fragments_of_several_sources() {
        let query = query();
        let ctx = PlanContext::new(&query);

        let leaves = StandardAgglutinator
            .agglutinate(&ctx, &sources(&query), MatchingOptions::default())
            .unwrap();

        assert_snapshot!(render(&leaves), @r"
        Union
          Endpoint(a): ?x <http://example.com/knows> ?y
          Endpoint(b): ?x <http://example.com/knows> ?y
        Endpoint(b): ?y <http://example.com/name> ?n
        ");
    }

    #[test]
    fn naive_keeps_one_leaf_per_source() {
        let query = query();
        let ctx = PlanContext::new(&query);

        let leaves = NaiveAgglutinator
            .agglutinate(&ctx, &sources(&query), MatchingOptions::default())
            .unwrap();

        assert_snapshot!(render(&leaves), @r"
        Endpoint(a): ?x <http://example.com/knows> ?y
        Endpoint(b): ?x <http://example.com/knows> ?y
        Endpoint(b): ?y <http://example.com/name> ?n
        ");
    }

    #[test]
    fn parallel_matches_the_standard_output() {
        let query = query();
        let ctx = PlanContext::new(&query);
        let pool = Arc::new(WorkerPool::new(2, Duration::from_secs(1)).unwrap());

        let parallel = ParallelAgglutinator::new(pool)
            .agglutinate(&ctx, &sources(&query), MatchingOptions::default())
            .unwrap();
        let standard = StandardAgglutinator
            .agglutinate(&ctx, &sources(&query), MatchingOptions::default())
            .unwrap();

        assert_eq!(render(&parallel), render(&standard));
    }

    #[test]
    fn exclusive_groups_and_unknown_triples_become_leaves() {
        let query = query();
        let ctx = PlanContext::new(&query);
        let verdict = SourceVerdict::new()
            .with_exclusive_group(
                Fragment::new(query.triples().iter().cloned()).with_required_inputs([var("x")]),
            )
            .with_unknown(query.triples()[1].clone());
        let state = StandardAgglutinator.create_state(&ctx);

        state
            .add_match(&source_with_verdict("a", SourceVerdict::new()), verdict)
            .unwrap();

        assert_snapshot!(render(&state.take_leaves().unwrap()), @r"
        Endpoint(a): ?x <http://example.com/knows> ?y . ?y <http://example.com/name> ?n (required: ?x)
        Endpoint(a): ?y <http://example.com/name> ?n
        ");
    }

    #[test]
    fn verdicts_are_sorted_by_source_name() {
        let query = query();
        let ctx = PlanContext::new(&query);
        let state = StandardAgglutinator.create_state(&ctx);
        for source in sources(&query) {
            let verdict = source.matcher().match_query(&query, ReasoningMode::Disabled).unwrap();
            state.add_match(&source, verdict).unwrap();
        }

        let names = state
            .source_verdicts()
            .unwrap()
            .into_iter()
            .map(|(source, _)| source.name().to_owned())
            .collect::<Vec<_>>();

        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn leaves_can_only_be_taken_once() {
        let query = query();
        let ctx = PlanContext::new(&query);
        let state = NaiveAgglutinator.create_state(&ctx);

        state.take_leaves().unwrap();

        assert!(matches!(
            state.take_leaves(),
            Err(FederationError::StateTaken)
        ));
    }

    #[test]
    fn unsupported_reasoning_skips_the_source() {
        let query = query();
        let ctx = PlanContext::new(&query);
        let options = MatchingOptions {
            reasoning: ReasoningMode::Rdfs,
            ..MatchingOptions::default()
        };

        let leaves = StandardAgglutinator
            .agglutinate(&ctx, &sources(&query), options)
            .unwrap();

        assert!(leaves.is_empty(), "{}", render(&leaves));
    }
}

use crate::agglutinator::AgglutinationState;
use crate::{Op, PlanContext, Source};
use fedfusion_common::{FedResult, FederationError, Fragment, SourceVerdict};
use fedfusion_model::{ConjunctiveQuery, FixedBitSet, TripleSet, Variable};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifies a fragment by its triples and its input interface. When fragments are not merged
/// across sources, the source is part of the identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FragmentKey {
    triples: FixedBitSet,
    required: FixedBitSet,
    optional: FixedBitSet,
    source: Option<Arc<str>>,
}

impl FragmentKey {
    fn sort_key(&self) -> (Vec<usize>, Vec<usize>, Vec<usize>, Option<Arc<str>>) {
        (
            self.triples.ones().collect(),
            self.required.ones().collect(),
            self.optional.ones().collect(),
            self.source.clone(),
        )
    }
}

#[derive(Debug)]
struct FragmentEntry {
    query: ConjunctiveQuery,
    required: Vec<Variable>,
    optional: Vec<Variable>,
    sources: Vec<Source>,
}

#[derive(Debug, Default)]
struct CollectorState {
    verdicts: BTreeMap<Arc<str>, (Source, SourceVerdict)>,
    fragments: FxHashMap<FragmentKey, FragmentEntry>,
    taken: bool,
}

/// The [AgglutinationState] shared by all agglutinators.
///
/// All mutable state sits behind a single mutex. Verdicts are converted into fragments before the
/// lock is taken.
#[derive(Debug)]
pub struct FragmentCollector {
    ctx: Arc<PlanContext>,
    query_triples: TripleSet,
    merge: bool,
    state: Mutex<CollectorState>,
}

impl FragmentCollector {
    /// Creates a new collector. If `merge` is set, equal fragments of different sources become a
    /// single union leaf.
    pub fn new(ctx: Arc<PlanContext>, merge: bool) -> Self {
        Self {
            query_triples: ctx.query_triples(),
            ctx,
            merge,
            state: Mutex::new(CollectorState::default()),
        }
    }

    fn lock(&self) -> FedResult<MutexGuard<'_, CollectorState>> {
        self.state
            .lock()
            .map_err(|_| FederationError::Other("The agglutination state is poisoned".into()))
    }

    /// Turns a verdict into keyed fragments. Fragments with triples outside the query are
    /// dropped.
    fn fragments_of(
        &self,
        source: &Source,
        verdict: &SourceVerdict,
    ) -> Vec<(FragmentKey, FragmentEntry)> {
        let unknown = verdict.unknown().iter().map(|triple| {
            tracing::debug!(
                "Planning triple of unknown relevance as relevant for source {}",
                source.name()
            );
            Fragment::single(triple.clone())
        });
        verdict
            .exclusive_groups()
            .iter()
            .chain(verdict.relevant())
            .cloned()
            .chain(unknown)
            .filter_map(|fragment| self.keyed_fragment(source, &fragment))
            .collect()
    }

    fn keyed_fragment(
        &self,
        source: &Source,
        fragment: &Fragment,
    ) -> Option<(FragmentKey, FragmentEntry)> {
        let triples = self.ctx.triple_set(fragment.triples());
        if fragment.triples().is_empty()
            || triples.len() != fragment.triples().len()
            || !triples.is_subset(&self.query_triples)
        {
            tracing::warn!(
                "Ignoring fragment of source {} with triples outside of the query",
                source.name()
            );
            return None;
        }
        let required = self.ctx.var_set(fragment.required_inputs());
        let optional = self
            .ctx
            .var_set(fragment.optional_inputs())
            .difference(&required);

        let entry = FragmentEntry {
            query: ConjunctiveQuery::new(triples.to_vec()),
            required: required.to_vec(),
            optional: optional.to_vec(),
            sources: vec![source.clone()],
        };
        let key = FragmentKey {
            triples: triples.into_bits(),
            required: required.into_bits(),
            optional: optional.into_bits(),
            source: (!self.merge).then(|| Arc::clone(source.shared_name())),
        };
        Some((key, entry))
    }
}

impl AgglutinationState for FragmentCollector {
    fn add_match(&self, source: &Source, verdict: SourceVerdict) -> FedResult<()> {
        let fragments = self.fragments_of(source, &verdict);

        let mut state = self.lock()?;
        if state.taken {
            return Err(FederationError::StateTaken);
        }
        for (key, entry) in fragments {
            match state.fragments.get_mut(&key) {
                Some(existing) => {
                    if !existing.sources.contains(source) {
                        existing.sources.push(source.clone());
                    }
                }
                None => {
                    state.fragments.insert(key, entry);
                }
            }
        }
        if state
            .verdicts
            .insert(
                Arc::clone(source.shared_name()),
                (source.clone(), verdict),
            )
            .is_some()
        {
            tracing::debug!("Replacing previous verdict of source {}", source.name());
        }
        Ok(())
    }

    fn source_verdicts(&self) -> FedResult<Vec<(Source, SourceVerdict)>> {
        Ok(self.lock()?.verdicts.values().cloned().collect())
    }

    fn take_leaves(&self) -> FedResult<Vec<Arc<Op>>> {
        let fragments = {
            let mut state = self.lock()?;
            if state.taken {
                return Err(FederationError::StateTaken);
            }
            state.taken = true;
            std::mem::take(&mut state.fragments)
        };

        let leaves = fragments
            .into_iter()
            .sorted_by_cached_key(|(key, _)| key.sort_key())
            .map(|(_, entry)| {
                let children = entry
                    .sources
                    .into_iter()
                    .sorted()
                    .map(|source| {
                        Arc::new(Op::endpoint(
                            &self.ctx,
                            source,
                            entry.query.clone(),
                            &entry.required,
                            &entry.optional,
                        ))
                    })
                    .collect();
                Op::union(&self.ctx, children)
            })
            .collect::<Vec<_>>();
        tracing::debug!("Agglutinated {} leaves", leaves.len());
        Ok(leaves)
    }
}

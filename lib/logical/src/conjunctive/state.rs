use crate::Op;
use fedfusion_model::FixedBitSet;

/// A partial plan of the search: a set of join-graph nodes with the triples they cover.
#[derive(Debug, Clone)]
pub(crate) struct PlanState {
    pub nodes: FixedBitSet,
    pub triples: FixedBitSet,
}

impl PlanState {
    fn with_capacity(nodes: usize, triples: usize) -> Self {
        Self {
            nodes: FixedBitSet::with_capacity(nodes),
            triples: FixedBitSet::with_capacity(triples),
        }
    }

    /// Adds node `id` to the state.
    pub fn add(&mut self, id: usize, node: &Op) {
        self.nodes.insert(id);
        self.triples.union_with(node.matched_triples().bits());
    }

    fn copy_from(&mut self, other: &PlanState) {
        self.nodes.clone_from(&other.nodes);
        self.triples.clone_from(&other.triples);
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.triples.clear();
    }
}

/// Recycles the bitsets of discarded states during one search.
#[derive(Debug)]
pub(crate) struct StatePool {
    nodes: usize,
    triples: usize,
    free: Vec<PlanState>,
}

impl StatePool {
    /// Creates a pool of states over `nodes` graph nodes and `triples` triple ids.
    pub fn new(nodes: usize, triples: usize) -> Self {
        Self {
            nodes,
            triples,
            free: Vec::new(),
        }
    }

    /// Returns an empty state.
    pub fn take(&mut self) -> PlanState {
        self.free
            .pop()
            .unwrap_or_else(|| PlanState::with_capacity(self.nodes, self.triples))
    }

    /// Returns a copy of `state`.
    pub fn take_copy(&mut self, state: &PlanState) -> PlanState {
        let mut result = self.take();
        result.copy_from(state);
        result
    }

    pub fn release(&mut self, mut state: PlanState) {
        state.clear();
        self.free.push(state);
    }
}

use crate::Op;
use fedfusion_model::FixedBitSet;
use std::sync::Arc;

/// Returns whether joining `a` and `b` is legal.
///
/// The two nodes must share a variable that is not a required input of both, and at most one of
/// them may be optional.
pub fn can_join(a: &Op, b: &Op) -> bool {
    if a.is_optional() && b.is_optional() {
        return false;
    }
    let shared = a.result_vars().intersection(b.result_vars());
    let both_required = a.required_inputs().intersection(b.required_inputs());
    !shared.difference(&both_required).is_empty()
}

/// The join graph of a set of plan nodes. Nodes are identified by their index.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    nodes: Vec<Arc<Op>>,
    adjacency: Vec<FixedBitSet>,
}

impl JoinGraph {
    /// Builds the graph with an edge between every pair of nodes that [can_join].
    pub fn new(nodes: Vec<Arc<Op>>) -> Self {
        let mut adjacency = vec![FixedBitSet::with_capacity(nodes.len()); nodes.len()];
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                if can_join(&nodes[i], &nodes[j]) {
                    adjacency[i].insert(j);
                    adjacency[j].insert(i);
                }
            }
        }
        Self { nodes, adjacency }
    }

    pub fn nodes(&self) -> &[Arc<Op>] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &Arc<Op> {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the neighbours of the node `id`.
    pub fn neighbours(&self, id: usize) -> &FixedBitSet {
        &self.adjacency[id]
    }

    pub fn are_adjacent(&self, a: usize, b: usize) -> bool {
        self.adjacency[a].contains(b)
    }
}

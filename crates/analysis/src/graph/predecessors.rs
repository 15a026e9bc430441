use std::ops;

use pureflow_util::index_containers::IndexMap;

use crate::graph::Node;

/// The inverse of a directed graph.
#[derive(Debug)]
pub struct Predecessors<N>(IndexMap<Vec<N>>);

impl<N: Node> Predecessors<N> {
    /// For every node in `nodes`, find its successors with `successors` and record the edge in
    /// reverse.
    ///
    /// Does not check for duplicate nodes in `nodes` or duplicate edges. A predecessor list will
    /// have duplicates if either contains them.
    pub fn compute<NI, SI>(nodes: NI, successors: impl Fn(N) -> SI) -> Self
    where
        NI: IntoIterator<Item = N>,
        SI: IntoIterator<Item = N>,
    {
        let mut predecessors = IndexMap::new();

        for p in nodes {
            for s in successors(p) {
                predecessors
                    .get_or_insert_with(s.index(), Vec::new)
                    .push(p);
            }
        }

        Self(predecessors)
    }

    /// Returns the accumulated predecessors of `node`.
    pub fn get(&self, node: N) -> &[N] {
        match self.0.get(node.index()) {
            Some(preds) => preds.as_slice(),
            None => &[],
        }
    }
}

impl<N: Node> ops::Index<N> for Predecessors<N> {
    type Output = [N];

    fn index(&self, index: N) -> &Self::Output {
        self.get(index)
    }
}

use arrayvec::ArrayVec;
use pureflow_util::{index_containers::IndexSet, typed_id_map::SecondaryMap};
use thiserror::Error;

use crate::{
    graph::{dfs::topological_order, predecessors::Predecessors},
    ir::{InstId, Procedure},
};

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CfgError {
    #[error("instruction {0} is in the instruction stream but does not exist")]
    MissingInstruction(InstId),
    #[error("instruction {from} jumps to {target} which is not in the instruction stream")]
    MissingJumpTarget { from: InstId, target: InstId },
}

/// Instruction-level control-flow graph of a single procedure.
///
/// The first instruction of the stream is the entry. An instruction's successors are the next
/// instruction in the stream (unless it is a `Jump` or `Return`) followed by its jump target,
/// if any.
#[derive(Debug)]
pub struct ControlFlowGraph {
    entry: Option<InstId>,
    successors: SecondaryMap<InstId, ArrayVec<InstId, 2>>,
    predecessors: Predecessors<InstId>,
    exits: Vec<InstId>,
    order: Vec<InstId>,
    reachable: IndexSet,
}

impl ControlFlowGraph {
    pub fn compute(procedure: &Procedure) -> Result<Self, CfgError> {
        let mut in_stream = IndexSet::new();
        for &inst_id in &procedure.body {
            if !procedure.instructions.contains(inst_id) {
                return Err(CfgError::MissingInstruction(inst_id));
            }
            in_stream.insert(inst_id.index() as usize);
        }

        let mut successors = SecondaryMap::new();
        let mut exits = Vec::new();

        for (i, &inst_id) in procedure.body.iter().enumerate() {
            let inst = &procedure.instructions[inst_id];
            let mut succ = ArrayVec::new();

            if inst.falls_through() {
                if let Some(&next) = procedure.body.get(i + 1) {
                    succ.push(next);
                }
            }

            if let Some(target) = inst.jump_target() {
                if !in_stream.contains(target.index() as usize) {
                    return Err(CfgError::MissingJumpTarget {
                        from: inst_id,
                        target,
                    });
                }
                if !succ.contains(&target) {
                    succ.push(target);
                }
            }

            if succ.is_empty() {
                exits.push(inst_id);
            }
            successors.insert(inst_id, succ);
        }

        let predecessors = Predecessors::compute(procedure.body.iter().copied(), |i| {
            successors[i].clone()
        });

        let mut order = match procedure.entry() {
            Some(entry) => topological_order(entry, |i| successors[i].clone()),
            None => Vec::new(),
        };

        // Unreachable instructions still get facts, after everything reachable.
        let reachable = order.iter().map(|i| i.index() as usize).collect::<IndexSet>();
        order.extend(
            procedure
                .body
                .iter()
                .copied()
                .filter(|i| !reachable.contains(i.index() as usize)),
        );

        Ok(Self {
            entry: procedure.entry(),
            successors,
            predecessors,
            exits,
            order,
            reachable,
        })
    }

    #[inline]
    pub fn entry(&self) -> Option<InstId> {
        self.entry
    }

    #[inline]
    pub fn successors(&self, inst_id: InstId) -> &[InstId] {
        match self.successors.get(inst_id) {
            Some(succ) => succ.as_slice(),
            None => &[],
        }
    }

    #[inline]
    pub fn predecessors(&self, inst_id: InstId) -> &[InstId] {
        self.predecessors.get(inst_id)
    }

    /// Instructions with no successors: returns and the final instruction if it falls off the
    /// end of the stream.
    #[inline]
    pub fn exits(&self) -> &[InstId] {
        &self.exits
    }

    /// Reverse postorder of the instructions reachable from the entry, followed by the
    /// unreachable instructions in stream order.
    #[inline]
    pub fn reverse_post_order(&self) -> &[InstId] {
        &self.order
    }

    pub fn post_order(&self) -> impl Iterator<Item = InstId> + '_ {
        self.order.iter().rev().copied()
    }

    pub fn is_reachable(&self, inst_id: InstId) -> bool {
        self.reachable.contains(inst_id.index() as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

use pureflow_util::typed_id_map::SecondaryMap;

use crate::{
    graph::cfg::ControlFlowGraph,
    ir::{InstId, Instruction, Procedure},
};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    /// Facts flow from the entry along control-flow edges.
    Forward,
    /// Facts flow from the exits against control-flow edges.
    Backward,
}

/// A dataflow problem over the instruction-level CFG of a procedure.
pub trait DataflowAnalysis {
    type Fact: Clone + Eq;

    const DIRECTION: Direction;

    /// The fact flowing into the entry (forward) or out of every exit (backward).
    fn boundary_fact(&self, procedure: &Procedure) -> Self::Fact;

    /// The identity of `meet`, the starting value for every program point.
    fn initial_fact(&self, procedure: &Procedure) -> Self::Fact;

    /// Merge `other` into `into`. Must be commutative, associative and idempotent.
    fn meet(&self, into: &mut Self::Fact, other: &Self::Fact);

    /// Compute the fact on the far side of `inst` given the fact on its near side (the fact
    /// before it for forward problems, the fact after it for backward problems).
    fn transfer(&self, inst_id: InstId, inst: &Instruction, fact: &Self::Fact) -> Self::Fact;
}

/// The fixed point facts immediately before and after every instruction of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataflowResults<F> {
    before: SecondaryMap<InstId, F>,
    after: SecondaryMap<InstId, F>,
}

impl<F> DataflowResults<F> {
    #[inline]
    pub fn before(&self, inst_id: InstId) -> Option<&F> {
        self.before.get(inst_id)
    }

    #[inline]
    pub fn after(&self, inst_id: InstId) -> Option<&F> {
        self.after.get(inst_id)
    }
}

/// Solve a dataflow problem to its fixed point.
///
/// Instructions are visited in reverse postorder (forward) or postorder (backward), repeating
/// until a whole round changes nothing. Every freshly transferred fact is met with the previous
/// fact at the same point, so each point only ever descends in the lattice and iteration is
/// bounded by the lattice height even when the transfer function is not monotone.
pub fn solve<A: DataflowAnalysis>(
    analysis: &A,
    procedure: &Procedure,
    cfg: &ControlFlowGraph,
) -> DataflowResults<A::Fact> {
    let initial = analysis.initial_fact(procedure);
    let boundary = analysis.boundary_fact(procedure);

    let order: Vec<InstId> = match A::DIRECTION {
        Direction::Forward => cfg.reverse_post_order().to_vec(),
        Direction::Backward => cfg.post_order().collect(),
    };

    // `input` holds the facts flowing into each transfer, `output` the facts coming out. They
    // are swapped into before/after at the end for backward problems.
    let mut input: SecondaryMap<InstId, A::Fact> =
        order.iter().map(|&i| (i, initial.clone())).collect();
    let mut output = input.clone();

    let mut rounds = 0;
    let mut changed = true;
    while changed {
        changed = false;
        rounds += 1;

        for &inst_id in &order {
            let (sources, is_boundary) = match A::DIRECTION {
                Direction::Forward => (
                    cfg.predecessors(inst_id),
                    cfg.entry() == Some(inst_id),
                ),
                Direction::Backward => {
                    let succ = cfg.successors(inst_id);
                    (succ, succ.is_empty())
                }
            };

            let mut new_input = if is_boundary {
                boundary.clone()
            } else {
                initial.clone()
            };
            for &source in sources {
                analysis.meet(&mut new_input, &output[source]);
            }

            let inst = &procedure.instructions[inst_id];
            let mut new_output = analysis.transfer(inst_id, inst, &new_input);
            analysis.meet(&mut new_output, &output[inst_id]);

            if new_input != input[inst_id] {
                input[inst_id] = new_input;
            }
            if new_output != output[inst_id] {
                output[inst_id] = new_output;
                changed = true;
            }
        }
    }

    log::trace!(
        "dataflow over `{}` stabilized after {rounds} rounds",
        procedure.name
    );

    match A::DIRECTION {
        Direction::Forward => DataflowResults {
            before: input,
            after: output,
        },
        Direction::Backward => DataflowResults {
            before: output,
            after: input,
        },
    }
}

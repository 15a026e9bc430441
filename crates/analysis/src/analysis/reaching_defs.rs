use std::collections::{BTreeSet, HashMap};

use crate::{
    dataflow::{DataflowAnalysis, DataflowResults, Direction, solve},
    graph::cfg::ControlFlowGraph,
    ir::{InstId, Instruction, Procedure, VarId},
};

/// For each variable, the instructions whose definition of it may reach a program point.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Definitions(HashMap<VarId, BTreeSet<InstId>>);

impl Definitions {
    pub fn defs_of(&self, var: VarId) -> impl Iterator<Item = InstId> + '_ {
        self.0.get(&var).into_iter().flatten().copied()
    }
}

pub struct ReachingDefinitions;

impl DataflowAnalysis for ReachingDefinitions {
    type Fact = Definitions;

    const DIRECTION: Direction = Direction::Forward;

    fn boundary_fact(&self, _: &Procedure) -> Definitions {
        Definitions::default()
    }

    fn initial_fact(&self, _: &Procedure) -> Definitions {
        Definitions::default()
    }

    fn meet(&self, into: &mut Definitions, other: &Definitions) {
        for (&var, defs) in &other.0 {
            into.0.entry(var).or_default().extend(defs.iter().copied());
        }
    }

    fn transfer(&self, inst_id: InstId, inst: &Instruction, fact: &Definitions) -> Definitions {
        let mut out = fact.clone();
        if let Some(def) = inst.def() {
            out.0.insert(def, BTreeSet::from([inst_id]));
        }
        out
    }
}

pub fn reaching_definitions(
    procedure: &Procedure,
    cfg: &ControlFlowGraph,
) -> DataflowResults<Definitions> {
    solve(&ReachingDefinitions, procedure, cfg)
}
